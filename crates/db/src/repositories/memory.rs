use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use taskpilot_core::audit::AuditEntry;
use taskpilot_core::domain::session::{Session, SessionId, Turn, UserId};
use taskpilot_core::domain::task::{text_matches, Task, TaskFilter, TaskId};

use super::{AuditLog, RepositoryError, SessionRepository, TaskRepository, TaskWrite};

#[derive(Default)]
struct TaskState {
    tasks: HashMap<String, Task>,
    audit: Vec<AuditEntry>,
}

/// Task and audit storage behind a single lock, so a commit is one critical
/// section.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    state: RwLock<TaskState>,
    fail_commits: AtomicBool,
}

impl InMemoryTaskRepository {
    /// Makes every subsequent `commit` fail without writing anything.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Every stored row, deleted ones included.
    pub async fn snapshot(&self) -> Vec<Task> {
        let state = self.state.read().await;
        let mut tasks = state.tasks.values().cloned().collect::<Vec<_>>();
        sort_by_creation(&mut tasks);
        tasks
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().await.audit.clone()
    }
}

fn sort_by_creation(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn live_for_owner<'a>(
    state: &'a TaskState,
    owner: &'a UserId,
) -> impl Iterator<Item = &'a Task> + 'a {
    state.tasks.values().filter(move |task| &task.owner == owner && !task.is_deleted())
}

#[async_trait::async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(
        &self,
        owner: &UserId,
        id: &TaskId,
    ) -> Result<Option<Task>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .get(&id.0)
            .filter(|task| &task.owner == owner && !task.is_deleted())
            .cloned())
    }

    async fn match_identifier(
        &self,
        owner: &UserId,
        identifier: &str,
    ) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.read().await;
        let mut matches = live_for_owner(&state, owner)
            .filter(|task| text_matches(task, identifier))
            .cloned()
            .collect::<Vec<_>>();
        sort_by_creation(&mut matches);
        Ok(matches)
    }

    async fn list_by_filter(
        &self,
        owner: &UserId,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.read().await;
        let mut tasks = live_for_owner(&state, owner)
            .filter(|task| filter.matches(task))
            .cloned()
            .collect::<Vec<_>>();
        tasks.sort_by(|a, b| {
            a.due_at
                .is_none()
                .cmp(&b.due_at.is_none())
                .then_with(|| a.due_at.cmp(&b.due_at))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tasks)
    }

    async fn recent(&self, owner: &UserId, limit: usize) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.read().await;
        let mut tasks = live_for_owner(&state, owner).cloned().collect::<Vec<_>>();
        sort_by_creation(&mut tasks);
        tasks.reverse();
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn commit(&self, writes: Vec<TaskWrite>) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Conflict("commits are disabled".to_owned()));
        }
        // Checked up front so a rejected batch writes nothing.
        for write in &writes {
            if let Some(stored) = state.tasks.get(&write.task.id.0) {
                if stored.is_deleted() || stored.owner != write.task.owner {
                    return Err(RepositoryError::Conflict(format!(
                        "task `{}` is deleted or owned by another user",
                        write.task.id.0
                    )));
                }
            }
        }
        for write in writes {
            state.tasks.insert(write.task.id.0.clone(), write.task);
            state.audit.push(write.audit);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuditLog for InMemoryTaskRepository {
    async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.audit.iter().filter(|entry| &entry.task_id == task_id).cloned().collect())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|entry| &entry.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, (Session, Vec<Turn>)>>,
}

impl InMemorySessionRepository {
    pub async fn turns(&self, session_id: &SessionId) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        sessions.get(&session_id.0).map(|(_, turns)| turns.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn ensure_session(
        &self,
        id: &SessionId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let (session, _) = sessions.entry(id.0.clone()).or_insert_with(|| {
            (Session { id: id.clone(), user_id: user_id.clone(), created_at: now }, Vec::new())
        });
        if &session.user_id != user_id {
            return Err(RepositoryError::Conflict(format!(
                "session `{}` belongs to another user",
                id.0
            )));
        }
        Ok(session.clone())
    }

    async fn append_turn(&self, turn: Turn) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let (_, turns) = sessions.get_mut(&turn.session_id.0).ok_or_else(|| {
            RepositoryError::Conflict(format!("unknown session `{}`", turn.session_id.0))
        })?;
        turns.push(turn);
        Ok(())
    }

    async fn recent_turns(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let Some((_, turns)) = sessions.get(&session_id.0) else {
            return Ok(Vec::new());
        };
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}
