use serde_json::json;
use taskpilot_core::domain::session::UserId;
use taskpilot_core::domain::task::{TaskFilter, TaskStatus};
use taskpilot_db::{SqlTaskRepository, TaskRepository};

use crate::commands::{query_failure, with_database, CommandResult};

/// Live tasks of one user, ordered by due date.
pub fn run(user: &str, status: Option<TaskStatus>) -> CommandResult {
    let owner = UserId(user.to_string());
    with_database("tasks", |pool| async move {
        let repository = SqlTaskRepository::new(pool);
        let filter = TaskFilter { status, ..TaskFilter::default() };
        let tasks = repository.list_by_filter(&owner, &filter).await.map_err(query_failure)?;
        Ok((
            format!("{} task(s) for user `{}`", tasks.len(), owner.0),
            Some(json!({ "tasks": tasks })),
        ))
    })
}
