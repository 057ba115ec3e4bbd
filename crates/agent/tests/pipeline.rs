use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use taskpilot_agent::llm::{CallKind, ScriptedCompletionService};
use taskpilot_agent::{AgentRuntime, ChatReply, RuntimeSettings};
use taskpilot_core::audit::AuditAction;
use taskpilot_core::domain::intent::IntentKind;
use taskpilot_core::domain::session::{SessionId, TurnRole, UserId};
use taskpilot_core::domain::task::{TaskPriority, TaskStatus};
use taskpilot_core::errors::GENERIC_FAILURE_MESSAGE;
use taskpilot_db::repositories::{
    InMemorySessionRepository, InMemoryTaskRepository, SessionRepository,
};

struct Harness {
    runtime: AgentRuntime,
    completion: Arc<ScriptedCompletionService>,
    tasks: Arc<InMemoryTaskRepository>,
    sessions: Arc<InMemorySessionRepository>,
}

impl Harness {
    fn new() -> Self {
        let completion = Arc::new(ScriptedCompletionService::new());
        let tasks = Arc::new(InMemoryTaskRepository::default());
        let sessions = Arc::new(InMemorySessionRepository::default());
        let runtime = AgentRuntime::new(
            completion.clone(),
            tasks.clone(),
            sessions.clone(),
            RuntimeSettings::default(),
        );
        Self { runtime, completion, tasks, sessions }
    }

    async fn say(&self, session: &SessionId, message: &str, classification: serde_json::Value) -> ChatReply {
        self.say_at(session, message, classification, now()).await
    }

    async fn say_at(
        &self,
        session: &SessionId,
        message: &str,
        classification: serde_json::Value,
        at: DateTime<Utc>,
    ) -> ChatReply {
        self.completion.push_classification(classification.to_string());
        self.runtime.process_at(&user(), Some(session.clone()), message, at).await
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 15, 45, 12).single().expect("timestamp")
}

fn user() -> UserId {
    UserId("user-1".to_owned())
}

fn session() -> SessionId {
    SessionId("session-1".to_owned())
}

#[tokio::test]
async fn create_with_embedded_time_sets_due_and_default_priority() {
    let harness = Harness::new();

    let reply = harness
        .say(
            &session(),
            "create a meeting for tomorrow at 2pm",
            json!({
                "intent": "CREATE_TASK",
                "confidence": 0.95,
                "entities": { "title": "meeting", "due_date": "tomorrow at 2pm" }
            }),
        )
        .await;

    assert!(reply.success);
    assert!(!reply.requires_clarification);
    assert_eq!(reply.intent, Some(IntentKind::CreateTask));
    assert_eq!(reply.message, "Task 'meeting' created successfully!");

    let tasks = harness.tasks.snapshot().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].due_at, Utc.with_ymd_and_hms(2026, 3, 11, 14, 0, 0).single());
    assert_eq!(tasks[0].priority, TaskPriority::Medium);

    let audit = harness.tasks.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Created);
    assert_eq!(audit[0].after.as_ref(), Some(&tasks[0]));

    let turns = harness.sessions.turns(&session()).await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(turns[1].role, TurnRole::Assistant);
    assert_eq!(turns[1].intent, Some(IntentKind::CreateTask));
    assert_eq!(
        turns[1].entities.as_ref().and_then(|entities| entities.get("title")),
        Some(&json!("meeting"))
    );
}

#[tokio::test]
async fn low_confidence_asks_and_changes_nothing() {
    let harness = Harness::new();

    let reply = harness
        .say(
            &session(),
            "do the thing",
            json!({ "intent": "DELETE_TASK", "confidence": 0.4, "entities": {} }),
        )
        .await;

    assert!(reply.requires_clarification);
    assert_eq!(reply.message, "Could you provide more details about what you'd like to do?");
    assert!(harness.tasks.snapshot().await.is_empty());
    assert!(harness.tasks.audit_entries().await.is_empty());

    let turns = harness.sessions.turns(&session()).await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].text, reply.message);
    assert_eq!(harness.completion.call_count(CallKind::Generate), 0);
}

#[tokio::test]
async fn follow_up_detail_merges_into_most_recent_task() {
    let harness = Harness::new();
    harness
        .say(
            &session(),
            "add buy groceries",
            json!({ "intent": "CREATE_TASK", "confidence": 0.9, "entities": { "title": "buy groceries" } }),
        )
        .await;

    let reply = harness
        .say_at(
            &session(),
            "add milk and eggs to the list",
            json!({
                "intent": "UPDATE_TASK",
                "confidence": 0.9,
                "entities": { "update_fields": { "description": "milk and eggs" } }
            }),
            now() + Duration::minutes(1),
        )
        .await;

    assert!(reply.success, "{reply:?}");
    let tasks = harness.tasks.snapshot().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "buy groceries");
    assert_eq!(tasks[0].description.as_deref(), Some("milk and eggs"));

    let audit = harness.tasks.audit_entries().await;
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1].action, AuditAction::Updated);
    assert_eq!(audit[1].before.as_ref().and_then(|task| task.description.clone()), None);

    // The first message is history for the second classification.
    let calls = harness.completion.calls();
    let second = calls.iter().filter(|call| call.kind == CallKind::Classify).nth(1).expect("call");
    assert!(second.prompt.contains("user: add buy groceries"));
    assert!(second.prompt.contains("buy groceries (status: pending"));
}

#[tokio::test]
async fn delete_all_completed_soft_deletes_each_with_one_audit_entry() {
    let harness = Harness::new();
    for (minute, title) in [(0, "water plants"), (1, "file taxes"), (2, "call mom")] {
        harness
            .say_at(
                &session(),
                &format!("add {title}"),
                json!({ "intent": "CREATE_TASK", "confidence": 0.9, "entities": { "title": title } }),
                now() + Duration::minutes(minute),
            )
            .await;
    }
    for (minute, target) in [(3, "plants"), (4, "taxes")] {
        let reply = harness
            .say_at(
                &session(),
                &format!("{target} is done"),
                json!({
                    "intent": "COMPLETE_TASK",
                    "confidence": 0.9,
                    "entities": { "task_identifier": target }
                }),
                now() + Duration::minutes(minute),
            )
            .await;
        assert!(reply.success);
    }

    let reply = harness
        .say_at(
            &session(),
            "delete all completed tasks",
            json!({
                "intent": "BULK_DELETE",
                "confidence": 0.92,
                "entities": { "bulk_criteria": { "status": "completed" } }
            }),
            now() + Duration::minutes(10),
        )
        .await;

    assert!(reply.success);
    assert_eq!(reply.intent, Some(IntentKind::BulkDelete));
    assert_eq!(reply.data.as_ref().and_then(|data| data.get("affected")), Some(&json!(2)));

    let tasks = harness.tasks.snapshot().await;
    let deleted = tasks.iter().filter(|task| task.is_deleted()).collect::<Vec<_>>();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.iter().all(|task| task.status == TaskStatus::Completed));

    let deletions = harness
        .tasks
        .audit_entries()
        .await
        .into_iter()
        .filter(|entry| entry.action == AuditAction::Deleted)
        .collect::<Vec<_>>();
    assert_eq!(deletions.len(), 2);
    for entry in deletions {
        let after = entry.after.expect("after snapshot");
        assert_eq!(after.deleted_at, Some(now() + Duration::minutes(10)));
        assert_eq!(entry.before.expect("before snapshot").deleted_at, None);
    }
}

#[tokio::test]
async fn bulk_with_no_matches_succeeds_with_zero() {
    let harness = Harness::new();

    let reply = harness
        .say(
            &session(),
            "complete every urgent task",
            json!({
                "intent": "BULK_COMPLETE",
                "confidence": 0.9,
                "entities": { "bulk_criteria": { "priority": "urgent" } }
            }),
        )
        .await;

    assert!(reply.success);
    assert_eq!(reply.message, "No tasks matched those criteria.");
    assert_eq!(reply.data.as_ref().and_then(|data| data.get("affected")), Some(&json!(0)));
    assert!(harness.tasks.audit_entries().await.is_empty());
}

#[tokio::test]
async fn answer_to_title_question_creates_the_task() {
    let harness = Harness::new();

    let first = harness
        .say(
            &session(),
            "create a task",
            json!({
                "intent": "CREATE_TASK",
                "confidence": 0.7,
                "entities": {},
                "clarification_needed": true,
                "clarification_question": "What task would you like to create?"
            }),
        )
        .await;
    assert!(first.requires_clarification);

    let second = harness
        .say(
            &session(),
            "Renew passport",
            json!({ "intent": "CREATE_TASK", "confidence": 0.8, "entities": {} }),
        )
        .await;

    assert!(second.success, "{second:?}");
    let tasks = harness.tasks.snapshot().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Renew passport");
}

#[tokio::test]
async fn unknown_target_asks_which_task() {
    let harness = Harness::new();

    let reply = harness
        .say(
            &session(),
            "delete the dentist task",
            json!({
                "intent": "DELETE_TASK",
                "confidence": 0.9,
                "entities": { "task_identifier": "dentist" }
            }),
        )
        .await;

    assert!(reply.requires_clarification);
    assert!(reply.message.contains("dentist"));
    assert!(harness.tasks.audit_entries().await.is_empty());
}

#[tokio::test]
async fn validation_failure_is_reported_without_mutation() {
    let harness = Harness::new();

    let reply = harness
        .say(
            &session(),
            "search",
            json!({ "intent": "SEARCH_TASKS", "confidence": 0.9, "entities": { "search_query": " " } }),
        )
        .await;

    assert!(!reply.success);
    assert!(!reply.requires_clarification);
    assert_eq!(reply.message, "What would you like me to search for?");

    let turns = harness.sessions.turns(&session()).await;
    assert_eq!(turns.last().map(|turn| turn.text.as_str()), Some(reply.message.as_str()));
}

#[tokio::test]
async fn store_failure_returns_generic_reply_with_session_id() {
    let harness = Harness::new();
    harness.tasks.fail_commits(true);

    let reply = harness
        .say(
            &session(),
            "add pay rent",
            json!({ "intent": "CREATE_TASK", "confidence": 0.9, "entities": { "title": "pay rent" } }),
        )
        .await;

    assert!(!reply.success);
    assert_eq!(reply.message, GENERIC_FAILURE_MESSAGE);
    assert_eq!(reply.session_id, session());
    assert!(harness.tasks.snapshot().await.is_empty());

    let turns = harness.sessions.turns(&session()).await;
    assert_eq!(turns.last().map(|turn| turn.text.as_str()), Some(GENERIC_FAILURE_MESSAGE));
}

#[tokio::test]
async fn missing_session_id_is_generated_and_echoed() {
    let harness = Harness::new();
    harness.completion.push_classification(
        json!({ "intent": "GET_STATISTICS", "confidence": 0.9, "entities": {} }).to_string(),
    );

    let reply = harness.runtime.process_at(&user(), None, "how am I doing?", now()).await;

    assert!(reply.success);
    assert!(!reply.session_id.0.is_empty());
    assert_eq!(reply.message, "You have 0 total tasks. Completion rate: 0%");
    assert_eq!(harness.sessions.turns(&reply.session_id).await.len(), 2);
}

#[tokio::test]
async fn foreign_session_is_refused_without_touching_its_history() {
    let harness = Harness::new();
    harness
        .sessions
        .ensure_session(&session(), &UserId("someone-else".to_owned()), now())
        .await
        .expect("seed session");

    let reply = harness
        .say(
            &session(),
            "list my tasks",
            json!({ "intent": "LIST_TASKS", "confidence": 0.9, "entities": {} }),
        )
        .await;

    assert!(!reply.success);
    assert_eq!(reply.session_id, session());
    assert!(harness.sessions.turns(&session()).await.is_empty());
}
