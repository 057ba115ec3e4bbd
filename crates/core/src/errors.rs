use thiserror::Error;

use crate::flows::PipelineTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task title is empty")]
    EmptyTitle,
    #[error("task title has {actual} characters, maximum is {max}")]
    TitleTooLong { max: usize, actual: usize },
    #[error("task has {actual} tags, maximum is {max}")]
    TooManyTags { max: usize, actual: usize },
    #[error("search query is empty")]
    EmptySearchQuery,
    #[error("bulk update carries no field changes")]
    EmptyBulkUpdate,
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyTitle => "Please tell me what the task should be called.".to_owned(),
            Self::TitleTooLong { max, .. } => {
                format!("That title is too long. Please keep it under {max} characters.")
            }
            Self::TooManyTags { max, .. } => {
                format!("A task can have at most {max} tags.")
            }
            Self::EmptySearchQuery => "What would you like me to search for?".to_owned(),
            Self::EmptyBulkUpdate => {
                "Tell me what to change on those tasks, for example a new priority or status."
                    .to_owned()
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no task matches `{identifier}`")]
    TaskNotFound { identifier: String },
    #[error("no target task for {action}")]
    MissingTarget { action: String },
    #[error(transparent)]
    PipelineTransition(#[from] PipelineTransitionError),
}

impl DomainError {
    /// Errors the user can fix by rephrasing; the pipeline answers with a
    /// question instead of a failure.
    pub fn needs_clarification(&self) -> bool {
        matches!(self, Self::TaskNotFound { .. } | Self::MissingTarget { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(error) => error.user_message(),
            Self::TaskNotFound { identifier } => {
                format!("I couldn't find a task matching \"{identifier}\". Which task did you mean?")
            }
            Self::MissingTarget { .. } => "Which task do you mean?".to_owned(),
            Self::PipelineTransition(_) => GENERIC_FAILURE_MESSAGE.to_owned(),
        }
    }
}

pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while handling your request. Please try again.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        Self::Domain(DomainError::Validation(value))
    }
}

impl ApplicationError {
    /// Text that is safe to show the end user. Infrastructure details stay in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Domain(error) => error.user_message(),
            Self::Persistence(_) | Self::Integration(_) | Self::Configuration(_) => {
                GENERIC_FAILURE_MESSAGE.to_owned()
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Domain(DomainError::Validation(_)))
    }

    pub fn needs_clarification(&self) -> bool {
        matches!(self, Self::Domain(error) if error.needs_clarification())
    }
}
