use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::UserId;
use crate::domain::task::{Task, TaskId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Updated,
    Completed,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Completed => "COMPLETED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CREATED" => Some(Self::Created),
            "UPDATED" => Some(Self::Updated),
            "COMPLETED" => Some(Self::Completed),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Immutable record of one task mutation with its surrounding snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub action: AuditAction,
    pub before: Option<Task>,
    pub after: Option<Task>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        before: Option<Task>,
        after: Task,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId(Uuid::new_v4().to_string()),
            task_id: after.id.clone(),
            user_id: after.owner.clone(),
            action,
            before,
            after: Some(after),
            occurred_at,
        }
    }

    pub fn created(task: &Task, occurred_at: DateTime<Utc>) -> Self {
        Self::new(AuditAction::Created, None, task.clone(), occurred_at)
    }

    pub fn changed(
        action: AuditAction,
        before: &Task,
        after: &Task,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(action, Some(before.clone()), after.clone(), occurred_at)
    }
}
