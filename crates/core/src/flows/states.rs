use serde::{Deserialize, Serialize};

/// Stage of a single inbound message as it moves through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Received,
    ContextGathered,
    Classified,
    Clarifying,
    Resolving,
    Executed,
    Responded,
    Persisted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Clarifying | Self::Persisted | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ContextGathered => "context_gathered",
            Self::Classified => "classified",
            Self::Clarifying => "clarifying",
            Self::Resolving => "resolving",
            Self::Executed => "executed",
            Self::Responded => "responded",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    ContextLoaded,
    IntentClassified,
    ClarificationRequired,
    CommandAccepted,
    CommandExecuted,
    CommandRejected,
    ResponseComposed,
    TurnPersisted,
    StepFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
}
