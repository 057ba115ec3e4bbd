pub mod engine;
pub mod states;

pub use engine::{PipelineMachine, PipelineTransitionError};
pub use states::{PipelineEvent, PipelineState, TransitionOutcome};
