//! Instinct records and the closed vocabularies that classify them.
//!
//! Every category is a sum type. Wire names are fixed by serde and by the
//! `FromStr` impls, which reject anything outside the set instead of guessing.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Domain
// ============================================================================

/// What part of the assistant's behavior an instinct governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Communication,
    Format,
    Workflow,
    ToolSelection,
    Verification,
    Timing,
    EmotionalState,
    LearningStyle,
    Expertise,
}

impl Domain {
    pub const ALL: [Domain; 9] = [
        Domain::Communication,
        Domain::Format,
        Domain::Workflow,
        Domain::ToolSelection,
        Domain::Verification,
        Domain::Timing,
        Domain::EmotionalState,
        Domain::LearningStyle,
        Domain::Expertise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Communication => "communication",
            Domain::Format => "format",
            Domain::Workflow => "workflow",
            Domain::ToolSelection => "tool_selection",
            Domain::Verification => "verification",
            Domain::Timing => "timing",
            Domain::EmotionalState => "emotional_state",
            Domain::LearningStyle => "learning_style",
            Domain::Expertise => "expertise",
        }
    }

    /// Section heading used when rendering a guidance digest.
    pub fn heading(&self) -> &'static str {
        match self {
            Domain::Communication => "Communication Style",
            Domain::Format => "Output Format Preferences",
            Domain::Workflow => "Workflow Patterns",
            Domain::ToolSelection => "Tool Selection Preferences",
            Domain::Verification => "Quality Standards",
            Domain::Timing => "Timing Preferences",
            Domain::EmotionalState => "Emotional Context",
            Domain::LearningStyle => "Learning Approach",
            Domain::Expertise => "Known Expertise Areas",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownDomain(s.to_string()))
    }
}

// ============================================================================
// Source
// ============================================================================

/// How an instinct came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    ExplicitUser,
    RepetitionConfirmed,
    CorrectionDetected,
    PreferenceExpressed,
    FrustrationDetected,
    SatisfactionDetected,
    ConfusionDetected,
    UrgencyDetected,
    ExpertiseDetected,
    LearningStyleDetected,
    ProfilePreset,
    Imported,
    ObservedPattern,
}

impl Source {
    pub const ALL: [Source; 13] = [
        Source::ExplicitUser,
        Source::RepetitionConfirmed,
        Source::CorrectionDetected,
        Source::PreferenceExpressed,
        Source::FrustrationDetected,
        Source::SatisfactionDetected,
        Source::ConfusionDetected,
        Source::UrgencyDetected,
        Source::ExpertiseDetected,
        Source::LearningStyleDetected,
        Source::ProfilePreset,
        Source::Imported,
        Source::ObservedPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::ExplicitUser => "explicit-user",
            Source::RepetitionConfirmed => "repetition-confirmed",
            Source::CorrectionDetected => "correction-detected",
            Source::PreferenceExpressed => "preference-expressed",
            Source::FrustrationDetected => "frustration-detected",
            Source::SatisfactionDetected => "satisfaction-detected",
            Source::ConfusionDetected => "confusion-detected",
            Source::UrgencyDetected => "urgency-detected",
            Source::ExpertiseDetected => "expertise-detected",
            Source::LearningStyleDetected => "learning-style-detected",
            Source::ProfilePreset => "profile-preset",
            Source::Imported => "imported",
            Source::ObservedPattern => "observed-pattern",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownSource(s.to_string()))
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstinctStatus {
    #[default]
    Active,
    Disabled,
}

impl InstinctStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstinctStatus::Active => "active",
            InstinctStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for InstinctStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstinctStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InstinctStatus::Active),
            "disabled" => Ok(InstinctStatus::Disabled),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Emotional state
// ============================================================================

/// Coarse mood of the user as inferred from their messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    #[default]
    Neutral,
    Engaged,
    Confused,
    Frustrated,
    Satisfied,
    Overwhelmed,
    Curious,
    Urgent,
}

impl EmotionalState {
    pub const ALL: [EmotionalState; 8] = [
        EmotionalState::Neutral,
        EmotionalState::Engaged,
        EmotionalState::Confused,
        EmotionalState::Frustrated,
        EmotionalState::Satisfied,
        EmotionalState::Overwhelmed,
        EmotionalState::Curious,
        EmotionalState::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalState::Neutral => "neutral",
            EmotionalState::Engaged => "engaged",
            EmotionalState::Confused => "confused",
            EmotionalState::Frustrated => "frustrated",
            EmotionalState::Satisfied => "satisfied",
            EmotionalState::Overwhelmed => "overwhelmed",
            EmotionalState::Curious => "curious",
            EmotionalState::Urgent => "urgent",
        }
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionalState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionalState::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownEmotionalState(s.to_string()))
    }
}

// ============================================================================
// Instinct
// ============================================================================

/// A learned trigger → action rule scoped to one conversation owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instinct {
    pub id: Uuid,
    pub context_id: String,
    pub domain: Domain,
    pub trigger: String,
    pub action: String,
    pub source: Source,
    /// Stored confidence. Decay is applied on read and never written back.
    pub base_confidence: f32,
    pub occurrence_count: u32,
    /// Exponential moving average of satisfaction (1) vs frustration (0).
    pub success_rate: f32,
    pub last_triggered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: InstinctStatus,
}

impl Instinct {
    pub fn is_active(&self) -> bool {
        self.status == InstinctStatus::Active
    }

    /// Fractional days since the instinct last fired, never negative.
    pub fn days_since_trigger(&self, now: DateTime<Utc>) -> f32 {
        let secs = (now - self.last_triggered_at).num_seconds().max(0);
        secs as f32 / 86_400.0
    }
}

/// Caller-supplied fields for a new instinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstinct {
    pub domain: Domain,
    pub trigger: String,
    pub action: String,
    pub source: Source,
    pub confidence: f32,
}

impl NewInstinct {
    pub fn new(
        domain: Domain,
        trigger: impl Into<String>,
        action: impl Into<String>,
        source: Source,
        confidence: f32,
    ) -> Self {
        Self {
            domain,
            trigger: trigger.into(),
            action: action.into(),
            source,
            confidence,
        }
    }

    /// Parse the string form used by tool calls and imports.
    pub fn parse(
        domain: &str,
        trigger: &str,
        action: &str,
        source: &str,
        confidence: f32,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            domain: domain.parse()?,
            trigger: trigger.to_string(),
            action: action.to_string(),
            source: source.parse()?,
            confidence,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trigger.trim().is_empty() {
            return Err(ValidationError::Empty("trigger"));
        }
        if self.action.trim().is_empty() {
            return Err(ValidationError::Empty("action"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

/// Reject blank owner scopes before they reach storage.
pub fn validate_context_id(context_id: &str) -> Result<(), ValidationError> {
    if context_id.trim().is_empty() {
        Err(ValidationError::Empty("context_id"))
    } else {
        Ok(())
    }
}
