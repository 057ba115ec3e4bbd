use thiserror::Error;

use crate::flows::states::{PipelineEvent, PipelineState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PipelineState, event: PipelineEvent },
    #[error("pipeline already finished in {state:?}")]
    AlreadyTerminal { state: PipelineState },
}

/// Pure transition table for the message pipeline.
#[derive(Clone, Debug, Default)]
pub struct PipelineMachine;

impl PipelineMachine {
    pub fn initial_state(&self) -> PipelineState {
        PipelineState::Received
    }

    pub fn apply(
        &self,
        current: PipelineState,
        event: PipelineEvent,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        use PipelineEvent::{
            ClarificationRequired, CommandAccepted, CommandExecuted, CommandRejected,
            ContextLoaded, IntentClassified, ResponseComposed, StepFailed, TurnPersisted,
        };
        use PipelineState::{
            Classified, Clarifying, ContextGathered, Executed, Failed, Persisted, Received,
            Resolving, Responded,
        };

        if current.is_terminal() {
            return Err(PipelineTransitionError::AlreadyTerminal { state: current });
        }

        let to = match (current, event) {
            (_, StepFailed) => Failed,
            (Received, ContextLoaded) => ContextGathered,
            (ContextGathered, IntentClassified) => Classified,
            (Classified, ClarificationRequired) | (Resolving, ClarificationRequired) => Clarifying,
            (Classified, CommandAccepted) => Resolving,
            (Resolving, CommandExecuted) => Executed,
            // Validation failures skip execution but still answer the user.
            (Resolving, CommandRejected) => Responded,
            (Executed, ResponseComposed) => Responded,
            (Responded, TurnPersisted) => Persisted,
            _ => {
                return Err(PipelineTransitionError::InvalidTransition { state: current, event });
            }
        };

        Ok(TransitionOutcome { from: current, to, event })
    }
}
