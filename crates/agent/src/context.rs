use std::sync::Arc;

use taskpilot_core::domain::session::{SessionId, Turn, TurnRole, UserId};
use taskpilot_core::domain::task::Task;
use taskpilot_db::repositories::{RepositoryError, SessionRepository, TaskRepository};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_RECENT_TASK_LIMIT: usize = 5;

/// What the classifier and gate know about the conversation before the
/// current message is recorded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationContext {
    /// Chronological, oldest first.
    pub turns: Vec<Turn>,
    /// Most recently created first.
    pub recent_tasks: Vec<Task>,
}

impl ConversationContext {
    pub fn last_assistant_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|turn| turn.role == TurnRole::Assistant)
    }

    pub fn most_recent_task(&self) -> Option<&Task> {
        self.recent_tasks.first()
    }

    /// Plain-text rendering embedded in the classification prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.turns.is_empty() {
            out.push_str("Conversation so far:\n");
            for turn in &self.turns {
                out.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.text));
            }
        }
        if !self.recent_tasks.is_empty() {
            out.push_str("Recent tasks:\n");
            for task in &self.recent_tasks {
                let due = task
                    .due_at
                    .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "none".to_owned());
                out.push_str(&format!(
                    "- [{}] {} (status: {}, priority: {}, due: {})",
                    task.id.0,
                    task.title,
                    task.status.as_str(),
                    task.priority.as_str(),
                    due
                ));
                if let Some(description) = task.description.as_deref() {
                    out.push_str(&format!(" - {description}"));
                }
                out.push('\n');
            }
        }
        out
    }
}

pub struct ContextAssembler {
    sessions: Arc<dyn SessionRepository>,
    tasks: Arc<dyn TaskRepository>,
    history_window: usize,
    recent_task_limit: usize,
}

impl ContextAssembler {
    pub fn new(sessions: Arc<dyn SessionRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self {
            sessions,
            tasks,
            history_window: DEFAULT_HISTORY_WINDOW,
            recent_task_limit: DEFAULT_RECENT_TASK_LIMIT,
        }
    }

    pub fn with_limits(mut self, history_window: usize, recent_task_limit: usize) -> Self {
        self.history_window = history_window;
        self.recent_task_limit = recent_task_limit;
        self
    }

    pub async fn assemble(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<ConversationContext, RepositoryError> {
        let turns = self.sessions.recent_turns(session_id, self.history_window).await?;
        let recent_tasks = self.tasks.recent(user_id, self.recent_task_limit).await?;
        Ok(ConversationContext { turns, recent_tasks })
    }
}
