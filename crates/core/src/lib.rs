//! Taskpilot domain core
//!
//! Tasks, sessions and typed intents, plus the rules that act on them:
//! relative date resolution (`dates`), field merging (`merge`), audit
//! entries (`audit`), layered configuration (`config`) and the message
//! pipeline state machine (`flows`). Storage and model access live in the
//! `taskpilot-db` and `taskpilot-agent` crates.

pub mod audit;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod merge;

pub use audit::{AuditAction, AuditEntry, AuditEntryId};
pub use dates::DateFilter;
pub use domain::command::{BulkAction, CommandOutcome, TaskCommand};
pub use domain::intent::{
    BulkCriteria, ClassificationResult, CompletionDirection, ExtractedIntent, IntentKind,
    ListEntities, TaskFields,
};
pub use domain::session::{Session, SessionId, Turn, TurnId, TurnRole, UserId};
pub use domain::task::{
    NewTask, Task, TaskFilter, TaskId, TaskPatch, TaskPriority, TaskStatistics, TaskStatus,
};
pub use errors::{ApplicationError, DomainError, ValidationError};
pub use flows::{PipelineEvent, PipelineMachine, PipelineState, PipelineTransitionError};
pub use merge::FieldUpdate;
