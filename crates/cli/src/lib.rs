pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use taskpilot_core::domain::task::TaskStatus;

#[derive(Debug, Parser)]
#[command(
    name = "taskpilot",
    about = "Taskpilot operator CLI",
    long_about = "Apply migrations, inspect configuration, and read tasks, audit trails and conversation history.",
    after_help = "Examples:\n  taskpilot migrate\n  taskpilot tasks --user u-1 --status pending\n  taskpilot history --session s-1 --limit 10"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List live tasks of a user")]
    Tasks {
        #[arg(long, help = "Owning user id")]
        user: String,
        #[arg(long, value_parser = parse_status, help = "pending|in_progress|completed|cancelled")]
        status: Option<TaskStatus>,
    },
    #[command(about = "Show the audit trail of a user, optionally for one task")]
    Audit {
        #[arg(long, help = "User id")]
        user: String,
        #[arg(long, help = "Restrict to one task id")]
        task: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    #[command(about = "Show the most recent turns of a conversation session")]
    History {
        #[arg(long, help = "Session id")]
        session: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(raw).ok_or_else(|| format!("unknown task status `{raw}`"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Tasks { user, status } => commands::tasks::run(&user, status),
        Command::Audit { user, task, limit } => commands::audit::run(&user, task.as_deref(), limit),
        Command::History { session, limit } => commands::history::run(&session, limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
