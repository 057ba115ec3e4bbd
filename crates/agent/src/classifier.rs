use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use taskpilot_core::domain::intent::{ClassificationResult, ExtractedIntent, IntentKind};

use crate::context::ConversationContext;
use crate::llm::{extract_json_object, CompletionService};

pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(20);

pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You classify messages sent to a task management assistant.

Intents:
- CREATE_TASK: create a new task
- LIST_TASKS: show tasks, optionally filtered
- UPDATE_TASK: change an existing task or add details to it
- SEARCH_TASKS: find tasks by keywords
- DELETE_TASK: remove one task
- COMPLETE_TASK: mark one task complete, or incomplete again
- BULK_DELETE: remove every task matching criteria
- BULK_UPDATE: change every task matching criteria
- BULK_COMPLETE: complete every task matching criteria
- GET_STATISTICS: summaries and counts
- UNCLEAR: the intent cannot be determined

Entities:
- title, description, priority (low|medium|high|urgent), status (pending|in_progress|completed|cancelled), tags (array)
- due_date and due_time: copy the user's wording exactly, do not convert it
- filters (LIST_TASKS): today, this_week, this_month, overdue, pending, completed, in_progress, high_priority
- search_query (SEARCH_TASKS)
- task_identifier (UPDATE_TASK, DELETE_TASK, COMPLETE_TASK): words naming the task; omit it when the user refers to "it" or the last task
- update_fields (UPDATE_TASK): object with the fields to change
- completion_action (COMPLETE_TASK): "complete" or "incomplete"
- bulk_criteria (BULK_*): object with status, priority, due_date_filter (today|this_week|this_month|overdue)
- bulk_updates (BULK_UPDATE): object with the fields to change

Respond only with JSON:
{"intent": "INTENT_NAME", "confidence": 0.95, "entities": {}, "clarification_needed": false, "clarification_question": null}

Set clarification_needed to true with a helpful question when unsure, and always for UNCLEAR."#;

/// Why a classification attempt produced nothing usable. Logged, then
/// converted to an UNCLEAR result; never returned to callers.
#[derive(Debug, Error)]
pub enum ClassificationFailure {
    #[error("completion provider failed: {0}")]
    Provider(String),
    #[error("completion provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("unparseable classification: {0}")]
    Unparseable(String),
}

impl ClassificationFailure {
    fn reason_code(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Unparseable(_) => "unparseable",
        }
    }
}

pub struct IntentClassifier {
    completion: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion, timeout: DEFAULT_CLASSIFY_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One provider call per invocation. Failures degrade to UNCLEAR.
    pub async fn classify(
        &self,
        message: &str,
        context: &ConversationContext,
    ) -> ClassificationResult {
        let prompt = classification_prompt(message, context);
        self.run(&prompt).await
    }

    /// Re-classifies `message` once the user has answered a clarification.
    pub async fn refine(
        &self,
        message: &str,
        prior_intent: IntentKind,
        clarification: &str,
        context: &ConversationContext,
    ) -> ClassificationResult {
        let prompt = format!(
            "{}Original message: \"{message}\"\nInitial intent: {}\nUser clarification: \"{clarification}\"\n\nRe-analyze the request with this clarification.",
            context.render(),
            prior_intent.as_str(),
        );
        self.run(&prompt).await
    }

    async fn run(&self, prompt: &str) -> ClassificationResult {
        match self.try_classify(prompt).await {
            Ok(result) => {
                info!(
                    event_name = "agent.classifier.classified",
                    intent = result.kind().as_str(),
                    confidence = result.confidence,
                    clarification_needed = result.clarification_needed,
                    "message classified"
                );
                result
            }
            Err(failure) => {
                warn!(
                    event_name = "agent.classifier.degraded",
                    reason_code = failure.reason_code(),
                    error = %failure,
                    "classification degraded to UNCLEAR"
                );
                ClassificationResult::unclear()
            }
        }
    }

    async fn try_classify(&self, prompt: &str) -> Result<ClassificationResult, ClassificationFailure> {
        let raw = tokio::time::timeout(
            self.timeout,
            self.completion.classify(prompt, CLASSIFIER_SYSTEM_PROMPT),
        )
        .await
        .map_err(|_| ClassificationFailure::Timeout(self.timeout))?
        .map_err(|error| ClassificationFailure::Provider(error.to_string()))?;

        parse_classification(&raw)
    }
}

fn classification_prompt(message: &str, context: &ConversationContext) -> String {
    format!("{}Current message: \"{message}\"", context.render())
}

/// Turns provider text into a typed result. Unknown intent names become
/// UNCLEAR with a clarification request rather than an error.
pub fn parse_classification(raw: &str) -> Result<ClassificationResult, ClassificationFailure> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ClassificationFailure::Unparseable("no JSON object in response".to_owned()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|error| ClassificationFailure::Unparseable(error.to_string()))?;
    if !value.is_object() {
        return Err(ClassificationFailure::Unparseable("response is not an object".to_owned()));
    }

    let confidence = match value.get("confidence") {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    let question = value
        .get("clarification_question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .map(str::to_owned);
    let requested = value.get("clarification_needed").and_then(Value::as_bool).unwrap_or(false);

    let kind = value
        .get("intent")
        .and_then(Value::as_str)
        .and_then(IntentKind::parse)
        .unwrap_or(IntentKind::Unclear);
    let entities = value.get("entities").cloned().unwrap_or(Value::Null);

    let mut result =
        ClassificationResult::new(ExtractedIntent::from_entities(kind, &entities), confidence);
    result.clarification_needed = requested || kind == IntentKind::Unclear;
    result.clarification_question = question;
    Ok(result)
}
