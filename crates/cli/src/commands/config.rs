use std::env;
use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use taskpilot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value as TomlValue;

use crate::commands::{CommandResult, EXIT_CONFIG};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        field("database.url", config.database.url.clone(), &["TASKPILOT_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["TASKPILOT_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["TASKPILOT_DATABASE_TIMEOUT_SECS"],
        ),
        field(
            "completion.timeout_secs",
            config.completion.timeout_secs.to_string(),
            &["TASKPILOT_COMPLETION_TIMEOUT_SECS"],
        ),
        field(
            "completion.max_retries",
            config.completion.max_retries.to_string(),
            &["TASKPILOT_COMPLETION_MAX_RETRIES"],
        ),
        field(
            "completion.retry_backoff_ms",
            config.completion.retry_backoff_ms.to_string(),
            &["TASKPILOT_COMPLETION_RETRY_BACKOFF_MS"],
        ),
        field(
            "pipeline.confidence_threshold",
            config.pipeline.confidence_threshold.to_string(),
            &["TASKPILOT_PIPELINE_CONFIDENCE_THRESHOLD"],
        ),
        field(
            "pipeline.history_window",
            config.pipeline.history_window.to_string(),
            &["TASKPILOT_PIPELINE_HISTORY_WINDOW"],
        ),
        field(
            "pipeline.recent_task_limit",
            config.pipeline.recent_task_limit.to_string(),
            &["TASKPILOT_PIPELINE_RECENT_TASK_LIMIT"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["TASKPILOT_LOGGING_LEVEL", "TASKPILOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["TASKPILOT_LOGGING_FORMAT", "TASKPILOT_LOG_FORMAT"],
        ),
    ];

    let entries = fields
        .into_iter()
        .map(|(key, value, env_keys)| {
            json!({
                "key": key,
                "value": value,
                "source": field_source(
                    key,
                    env_keys,
                    config_file_doc.as_ref(),
                    config_file_path.as_deref(),
                ),
            })
        })
        .collect::<Vec<Value>>();

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(json!({ "fields": entries })),
    )
}

type Field = (&'static str, String, &'static [&'static str]);

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    (key, value, env_keys)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<TomlValue> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<TomlValue>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&TomlValue>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &TomlValue, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
