use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use taskpilot_core::domain::command::{BulkAction, CommandOutcome};
use taskpilot_core::domain::intent::{CompletionDirection, IntentKind};

use crate::llm::CompletionService;

pub const DEFAULT_COMPOSE_TIMEOUT: Duration = Duration::from_secs(20);

pub const COMPOSER_SYSTEM_PROMPT: &str = "You are a friendly task assistant. \
Confirm what was done in two or three short sentences. \
When listing tasks use bullet points with priority and due date. \
When nothing matched, say so plainly and suggest a next step.";

/// Words the reply to the user. Provider trouble falls back to fixed
/// templates, so composing never fails.
pub struct ResponseComposer {
    completion: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl ResponseComposer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion, timeout: DEFAULT_COMPOSE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn compose(
        &self,
        message: &str,
        intent: IntentKind,
        outcome: &CommandOutcome,
    ) -> String {
        let rendered = serde_json::to_string_pretty(outcome).unwrap_or_default();
        let prompt = format!(
            "User said: \"{message}\"\nDetected intent: {}\nAction result: {rendered}\n\nReply to the user.",
            intent.as_str()
        );

        let reason = match tokio::time::timeout(
            self.timeout,
            self.completion.generate(&prompt, COMPOSER_SYSTEM_PROMPT),
        )
        .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => return text.trim().to_owned(),
            Ok(Ok(_)) => "blank_reply".to_owned(),
            Ok(Err(error)) => format!("provider_error: {error}"),
            Err(_) => "timeout".to_owned(),
        };

        warn!(
            event_name = "agent.composer.fallback",
            intent = intent.as_str(),
            reason = %reason,
            "using fallback reply"
        );
        fallback_reply(outcome)
    }
}

pub fn fallback_reply(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Created(task) => format!("Task '{}' created successfully!", task.title),
        CommandOutcome::Updated(task) => format!("Task '{}' updated successfully!", task.title),
        CommandOutcome::Completed { task, direction: CompletionDirection::Complete } => {
            format!("Great! Task '{}' is now complete!", task.title)
        }
        CommandOutcome::Completed { task, direction: CompletionDirection::Reopen } => {
            format!("Task '{}' is pending again.", task.title)
        }
        CommandOutcome::Deleted(task) => format!("Task '{}' deleted.", task.title),
        CommandOutcome::Listed { tasks } => {
            format!("You have {} task(s) matching your criteria.", tasks.len())
        }
        CommandOutcome::Searched { query, tasks } => {
            format!("Found {} task(s) matching '{query}'.", tasks.len())
        }
        CommandOutcome::Statistics(stats) => format!(
            "You have {} total tasks. Completion rate: {}%",
            stats.total_tasks, stats.completion_rate
        ),
        CommandOutcome::Bulk { affected: 0, .. } => "No tasks matched those criteria.".to_owned(),
        CommandOutcome::Bulk { action, affected } => {
            let verb = match action {
                BulkAction::Update => "Updated",
                BulkAction::Delete => "Deleted",
                BulkAction::Complete => "Completed",
            };
            format!("{verb} {affected} task(s).")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use taskpilot_core::domain::command::{BulkAction, CommandOutcome};
    use taskpilot_core::domain::intent::IntentKind;
    use taskpilot_core::domain::session::UserId;
    use taskpilot_core::domain::task::{NewTask, TaskPriority};

    use super::{fallback_reply, ResponseComposer};
    use crate::llm::{CallKind, ScriptedCompletionService, ScriptedResponse};

    fn created() -> CommandOutcome {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().expect("timestamp");
        CommandOutcome::Created(
            NewTask {
                title: "Team meeting".to_owned(),
                description: None,
                priority: TaskPriority::Medium,
                due_at: None,
                tags: Vec::new(),
            }
            .into_task(UserId("u-1".to_owned()), at),
        )
    }

    #[tokio::test]
    async fn provider_text_is_used_when_present() {
        let scripted = Arc::new(ScriptedCompletionService::new());
        scripted.push_generation("  Done, your meeting is on the list.  ");

        let reply = ResponseComposer::new(scripted.clone())
            .compose("add team meeting", IntentKind::CreateTask, &created())
            .await;

        assert_eq!(reply, "Done, your meeting is on the list.");
        let calls = scripted.calls();
        assert_eq!(calls[0].kind, CallKind::Generate);
        assert!(calls[0].prompt.contains("CREATE_TASK"));
        assert!(calls[0].prompt.contains("Team meeting"));
    }

    #[tokio::test]
    async fn blank_or_failed_generation_uses_template() {
        let scripted = Arc::new(ScriptedCompletionService::new());
        scripted
            .push_generation("   ")
            .push_generation_response(ScriptedResponse::Fail("quota".to_owned()));
        let composer = ResponseComposer::new(scripted);

        for _ in 0..2 {
            let reply = composer.compose("add", IntentKind::CreateTask, &created()).await;
            assert_eq!(reply, "Task 'Team meeting' created successfully!");
        }
    }

    #[tokio::test]
    async fn slow_generation_times_out_to_template() {
        let scripted = Arc::new(ScriptedCompletionService::new());
        scripted.push_generation_response(ScriptedResponse::Delayed(
            Duration::from_millis(500),
            "too late".to_owned(),
        ));

        let reply = ResponseComposer::new(scripted)
            .with_timeout(Duration::from_millis(20))
            .compose("add", IntentKind::CreateTask, &created())
            .await;

        assert_eq!(reply, "Task 'Team meeting' created successfully!");
    }

    #[test]
    fn bulk_templates_report_counts() {
        assert_eq!(
            fallback_reply(&CommandOutcome::Bulk { action: BulkAction::Delete, affected: 0 }),
            "No tasks matched those criteria."
        );
        assert_eq!(
            fallback_reply(&CommandOutcome::Bulk { action: BulkAction::Complete, affected: 3 }),
            "Completed 3 task(s)."
        );
    }
}
