use serde_json::json;
use taskpilot_core::domain::session::UserId;
use taskpilot_core::domain::task::TaskId;
use taskpilot_db::{AuditLog, SqlTaskRepository};

use crate::commands::{query_failure, with_database, CommandResult};

/// Audit trail of a user, optionally narrowed to one task. Newest first
/// for the user view, chronological for a single task.
pub fn run(user: &str, task: Option<&str>, limit: usize) -> CommandResult {
    let user_id = UserId(user.to_string());
    let task_id = task.map(|task| TaskId(task.to_string()));
    with_database("audit", |pool| async move {
        let repository = SqlTaskRepository::new(pool);
        let entries = match task_id {
            Some(task_id) => repository
                .list_for_task(&task_id)
                .await
                .map_err(query_failure)?
                .into_iter()
                .filter(|entry| entry.user_id == user_id)
                .take(limit)
                .collect::<Vec<_>>(),
            None => repository.list_for_user(&user_id, limit).await.map_err(query_failure)?,
        };
        Ok((
            format!("{} audit entries for user `{}`", entries.len(), user_id.0),
            Some(json!({ "entries": entries })),
        ))
    })
}
