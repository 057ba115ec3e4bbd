use serde::{Deserialize, Serialize};

use crate::domain::intent::CompletionDirection;
use crate::domain::task::{NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatistics};

/// Fully resolved instruction. Built once by the resolver and moved into
/// the executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TaskCommand {
    Create(NewTask),
    Update { task_id: TaskId, patch: TaskPatch },
    Complete { task_id: TaskId, direction: CompletionDirection },
    Delete { task_id: TaskId },
    List(TaskFilter),
    Search { query: String },
    Statistics,
    BulkUpdate { criteria: TaskFilter, patch: TaskPatch },
    BulkDelete { criteria: TaskFilter },
    BulkComplete { criteria: TaskFilter },
}

impl TaskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Complete { .. } => "complete",
            Self::Delete { .. } => "delete",
            Self::List(_) => "list",
            Self::Search { .. } => "search",
            Self::Statistics => "statistics",
            Self::BulkUpdate { .. } => "bulk_update",
            Self::BulkDelete { .. } => "bulk_delete",
            Self::BulkComplete { .. } => "bulk_complete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Search { .. } | Self::Statistics)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Update,
    Delete,
    Complete,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Created(Task),
    Updated(Task),
    Completed { task: Task, direction: CompletionDirection },
    Deleted(Task),
    Listed { tasks: Vec<Task> },
    Searched { query: String, tasks: Vec<Task> },
    Statistics(TaskStatistics),
    Bulk { action: BulkAction, affected: usize },
}

impl CommandOutcome {
    pub fn affected_task(&self) -> Option<&Task> {
        match self {
            Self::Created(task) | Self::Updated(task) | Self::Deleted(task) => Some(task),
            Self::Completed { task, .. } => Some(task),
            _ => None,
        }
    }
}
