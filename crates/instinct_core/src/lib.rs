//! Core vocabulary of the adaptive behavior engine: instinct records, the
//! confidence model, conflict rules, configuration and the tool surface.

pub mod confidence;
pub mod config;
pub mod error;
pub mod rules;
pub mod tools;
pub mod types;

pub use confidence::{ConfidenceBreakdown, ConfidenceModel, ConfidenceParams};
pub use config::EngineConfig;
pub use error::{InstinctError, Result, ValidationError};
pub use rules::{default_rules, ActionPattern, ConflictRule};
pub use types::{
    validate_context_id, Domain, EmotionalState, Instinct, InstinctStatus, NewInstinct, Source,
};
