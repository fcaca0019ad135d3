use thiserror::Error;
use uuid::Uuid;

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown domain: '{0}'")]
    UnknownDomain(String),
    #[error("unknown source: '{0}'")]
    UnknownSource(String),
    #[error("unknown emotional state: '{0}'")]
    UnknownEmotionalState(String),
    #[error("unknown status: '{0}'")]
    UnknownStatus(String),
    #[error("confidence {0} outside [0.0, 1.0]")]
    ConfidenceOutOfRange(f32),
    #[error("confidence delta must be finite")]
    NonFiniteDelta,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("malformed import payload: {0}")]
    MalformedImport(String),
    #[error("invalid trigger pattern '{pattern}': {reason}")]
    InvalidTriggerPattern { pattern: String, reason: String },
    #[error("{name} = {value} is out of range")]
    ParameterOutOfRange { name: &'static str, value: f32 },
}

/// Errors surfaced by the behavior engine.
#[derive(Debug, Error)]
pub enum InstinctError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("instinct {id} not found in context '{context_id}'")]
    NotFound { context_id: String, id: Uuid },

    #[error("unknown profile: '{0}'")]
    UnknownProfile(String),

    /// Log or snapshot I/O failed. The log write is the commit point, so the
    /// caller must retry the whole operation.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl InstinctError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when retrying the same call cannot succeed.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, InstinctError>;
