use tracing::info;

use taskpilot_core::domain::intent::{ClassificationResult, IntentKind};

use crate::context::ConversationContext;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;
pub const DEFAULT_CLARIFICATION_QUESTION: &str =
    "Could you provide more details about what you'd like to do?";

const TITLE_PROMPT_MARKERS: [&str; 2] = ["what task", "specify"];

#[derive(Clone, Debug, PartialEq)]
pub enum GateDecision {
    Proceed(ClassificationResult),
    Clarify { reason_code: &'static str, intent: IntentKind, question: String },
}

/// Decides whether a classification is solid enough to act on.
#[derive(Clone, Debug, PartialEq)]
pub struct ClarificationGate {
    pub confidence_threshold: f64,
}

impl Default for ClarificationGate {
    fn default() -> Self {
        Self { confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD }
    }
}

impl ClarificationGate {
    pub fn new(confidence_threshold: f64) -> Self {
        Self { confidence_threshold }
    }

    pub fn evaluate(
        &self,
        message: &str,
        mut result: ClassificationResult,
        context: &ConversationContext,
    ) -> GateDecision {
        correct_create_title(message, &mut result, context);

        let reason_code = if result.clarification_needed {
            Some("clarification_requested")
        } else if result.kind() == IntentKind::Unclear {
            Some("unclear_intent")
        } else if result.confidence < self.confidence_threshold {
            Some("low_confidence")
        } else {
            None
        };

        match reason_code {
            Some(reason_code) => GateDecision::Clarify {
                reason_code,
                intent: result.kind(),
                question: result
                    .clarification_question
                    .unwrap_or_else(|| DEFAULT_CLARIFICATION_QUESTION.to_owned()),
            },
            None => GateDecision::Proceed(result),
        }
    }
}

/// A bare reply to "what task should I create?" is the title itself.
fn correct_create_title(
    message: &str,
    result: &mut ClassificationResult,
    context: &ConversationContext,
) {
    if result.kind() != IntentKind::CreateTask || result.intent.create_title().is_some() {
        return;
    }
    let asked_for_title = context.last_assistant_turn().is_some_and(|turn| {
        let text = turn.text.to_lowercase();
        TITLE_PROMPT_MARKERS.iter().any(|marker| text.contains(marker))
    });
    let title = message.trim();
    if asked_for_title && !title.is_empty() {
        info!(
            event_name = "agent.guardrails.title_corrected",
            title,
            "using clarification answer as task title"
        );
        result.intent.set_create_title(title);
    }
}
