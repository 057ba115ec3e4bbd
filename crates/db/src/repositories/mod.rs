use async_trait::async_trait;
use thiserror::Error;

use taskpilot_core::audit::AuditEntry;
use taskpilot_core::domain::session::{Session, SessionId, Turn, UserId};
use taskpilot_core::domain::task::{Task, TaskFilter, TaskId};

pub mod memory;
pub mod session;
pub mod task;

pub use memory::{InMemorySessionRepository, InMemoryTaskRepository};
pub use session::SqlSessionRepository;
pub use task::SqlTaskRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// New task state paired with the audit entry describing how it got there.
/// The two are always written together.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskWrite {
    pub task: Task,
    pub audit: AuditEntry,
}

/// Owner-scoped task storage. Reads never return soft-deleted rows.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, owner: &UserId, id: &TaskId)
        -> Result<Option<Task>, RepositoryError>;

    /// Case-insensitive substring match on title or description, oldest first.
    async fn match_identifier(
        &self,
        owner: &UserId,
        identifier: &str,
    ) -> Result<Vec<Task>, RepositoryError>;

    async fn list_by_filter(
        &self,
        owner: &UserId,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, RepositoryError>;

    /// Most recently created tasks first.
    async fn recent(&self, owner: &UserId, limit: usize) -> Result<Vec<Task>, RepositoryError>;

    /// Persists every write and its audit entry atomically: all or nothing.
    async fn commit(&self, writes: Vec<TaskWrite>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<AuditEntry>, RepositoryError>;

    /// Newest entries first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Append-only conversation history.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Returns the stored session, creating it for `user_id` when absent.
    /// A session owned by another user is a conflict.
    async fn ensure_session(
        &self,
        id: &SessionId,
        user_id: &UserId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Session, RepositoryError>;

    async fn append_turn(&self, turn: Turn) -> Result<(), RepositoryError>;

    /// The last `limit` turns in chronological order.
    async fn recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError>;
}
