use std::process::ExitCode;

use taskpilot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use taskpilot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // stdout carries the JSON command payload.
    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .compact()
                .init();
        }
        Pretty => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .pretty()
                .init();
        }
        Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .json()
                .init();
        }
    }
}

fn main() -> ExitCode {
    // An invalid config is reported by the command itself with exit code 2.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
        tracing::debug!(
            event_name = "system.cli.started",
            log_format = ?config.logging.format,
            "taskpilot cli started"
        );
    }
    taskpilot_cli::run()
}
