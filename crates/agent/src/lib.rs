//! Conversational task agent
//!
//! Turns one free-text message into at most one task command:
//! 1. **Context** (`context`) - recent turns and recently created tasks
//! 2. **Classification** (`classifier`) - provider output parsed into a typed intent
//! 3. **Clarification gate** (`guardrails`) - ask instead of guessing
//! 4. **Resolution** (`resolver`) - intent to command against concrete tasks
//! 5. **Execution** (`executor`) - atomic task write plus audit entry
//! 6. **Reply** (`composer`) - provider wording with fixed fallbacks
//!
//! `runtime::AgentRuntime` drives the steps through the pipeline state
//! machine from `taskpilot_core::flows`.
//!
//! The completion provider only translates language. It never decides which
//! task a command touches or what gets written.

pub mod classifier;
pub mod composer;
pub mod context;
pub mod executor;
pub mod guardrails;
pub mod llm;
pub mod resolver;
pub mod runtime;

pub use classifier::{ClassificationFailure, IntentClassifier};
pub use composer::ResponseComposer;
pub use context::{ContextAssembler, ConversationContext};
pub use executor::TaskExecutor;
pub use guardrails::{ClarificationGate, GateDecision};
pub use llm::{CompletionService, RetryingCompletion, ScriptedCompletionService};
pub use resolver::CommandResolver;
pub use runtime::{AgentRuntime, ChatReply, RuntimeSettings};
