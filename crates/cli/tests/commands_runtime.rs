use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use serde_json::Value;
use taskpilot_cli::commands::{audit, config, history, migrate, tasks};
use taskpilot_core::audit::AuditEntry;
use taskpilot_core::domain::session::{SessionId, Turn, UserId};
use taskpilot_core::domain::task::{NewTask, TaskPriority, TaskStatus};
use taskpilot_db::repositories::TaskWrite;
use taskpilot_db::{
    connect, migrations, SessionRepository, SqlSessionRepository, SqlTaskRepository,
    TaskRepository,
};

const MEMORY_DB: &[(&str, &str)] =
    &[("TASKPILOT_DATABASE_URL", "sqlite::memory:"), ("TASKPILOT_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["data"]["applied_migrations"].as_i64().unwrap_or_default() >= 1);
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_log_format() {
    with_env(&[("TASKPILOT_LOG_FORMAT", "xml")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_reports_sources_per_field() {
    with_env(&[("TASKPILOT_LOG_LEVEL", "debug")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        let fields = payload["data"]["fields"].as_array().cloned().unwrap_or_default();
        let level = fields
            .iter()
            .find(|field| field["key"] == "logging.level")
            .expect("logging.level should be reported");
        assert_eq!(level["value"], "debug");
        assert_eq!(level["source"], "env (TASKPILOT_LOG_LEVEL)");

        let threshold = fields
            .iter()
            .find(|field| field["key"] == "pipeline.confidence_threshold")
            .expect("confidence threshold should be reported");
        assert_eq!(threshold["source"], "default");
    });
}

#[test]
fn config_rejects_out_of_range_threshold() {
    with_env(&[("TASKPILOT_PIPELINE_CONFIDENCE_THRESHOLD", "1.5")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn read_commands_return_empty_data_on_fresh_database() {
    with_env(MEMORY_DB, || {
        let listed = parse_payload(&tasks::run("u-1", None).output);
        assert_eq!(listed["status"], "ok");
        assert_eq!(listed["data"]["tasks"], Value::Array(Vec::new()));

        let trail = parse_payload(&audit::run("u-1", None, 50).output);
        assert_eq!(trail["status"], "ok");
        assert_eq!(trail["data"]["entries"], Value::Array(Vec::new()));

        let turns = parse_payload(&history::run("s-1", 20).output);
        assert_eq!(turns["status"], "ok");
        assert_eq!(turns["data"]["turns"], Value::Array(Vec::new()));
    });
}

#[test]
fn read_commands_show_seeded_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("taskpilot.db"));
    let task_id = seed_database(&url);

    with_env(&[("TASKPILOT_DATABASE_URL", url.as_str())], || {
        let pending = parse_payload(&tasks::run("u-1", Some(TaskStatus::Pending)).output);
        let listed = pending["data"]["tasks"].as_array().cloned().unwrap_or_default();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["title"], "Write report");

        let completed = parse_payload(&tasks::run("u-1", Some(TaskStatus::Completed)).output);
        assert_eq!(completed["data"]["tasks"], Value::Array(Vec::new()));

        let foreign = parse_payload(&tasks::run("u-2", None).output);
        assert_eq!(foreign["data"]["tasks"], Value::Array(Vec::new()));

        let trail = parse_payload(&audit::run("u-1", Some(task_id.as_str()), 50).output);
        let entries = trail["data"]["entries"].as_array().cloned().unwrap_or_default();
        assert_eq!(entries.len(), 1);

        let hidden = parse_payload(&audit::run("u-2", Some(task_id.as_str()), 50).output);
        assert_eq!(hidden["data"]["entries"], Value::Array(Vec::new()));

        let turns = parse_payload(&history::run("s-1", 20).output);
        let turns = turns["data"]["turns"].as_array().cloned().unwrap_or_default();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["text"], "add write report");
    });
}

fn database_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn seed_database(url: &str) -> String {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build");

    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let now = Utc::now();
        let owner = UserId("u-1".to_string());
        let task = NewTask {
            title: "Write report".to_string(),
            description: None,
            priority: TaskPriority::High,
            due_at: None,
            tags: vec!["work".to_string()],
        }
        .into_task(owner.clone(), now);
        let task_id = task.id.0.clone();
        let audit = AuditEntry::created(&task, now);
        SqlTaskRepository::new(pool.clone())
            .commit(vec![TaskWrite { task, audit }])
            .await
            .expect("seed task");

        let sessions = SqlSessionRepository::new(pool.clone());
        let session_id = SessionId("s-1".to_string());
        sessions.ensure_session(&session_id, &owner, now).await.expect("session");
        sessions
            .append_turn(Turn::user(session_id, "add write report", now))
            .await
            .expect("seed turn");

        pool.close().await;
        task_id
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TASKPILOT_DATABASE_URL",
        "TASKPILOT_DATABASE_MAX_CONNECTIONS",
        "TASKPILOT_DATABASE_TIMEOUT_SECS",
        "TASKPILOT_COMPLETION_TIMEOUT_SECS",
        "TASKPILOT_COMPLETION_MAX_RETRIES",
        "TASKPILOT_COMPLETION_RETRY_BACKOFF_MS",
        "TASKPILOT_PIPELINE_CONFIDENCE_THRESHOLD",
        "TASKPILOT_PIPELINE_HISTORY_WINDOW",
        "TASKPILOT_PIPELINE_RECENT_TASK_LIMIT",
        "TASKPILOT_LOGGING_LEVEL",
        "TASKPILOT_LOGGING_FORMAT",
        "TASKPILOT_LOG_LEVEL",
        "TASKPILOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
