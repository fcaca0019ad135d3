use crate::confidence::{check, ConfidenceParams};
use crate::error::ValidationError;
use crate::rules::ConflictRule;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub confidence: ConfidenceParams,
    pub injection: InjectionConfig,
    pub observation: ObservationConfig,
    pub staleness: StalenessConfig,
    /// Appended after the built-in rules.
    pub conflict_rules: Vec<ConflictRule>,
}

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied and the result is validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: EngineConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.validate().context("Invalid engine config")?;
        Ok(config)
    }

    /// Load from path, or use defaults with env overrides when the file does not exist.
    /// A file that exists but does not parse or validate is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        tracing::info!("Config file {} not found, using defaults", path.as_ref().display());
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate().context("Invalid engine config from environment")?;
        Ok(cfg)
    }

    /// Range checks for every numeric parameter the engine reads.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.confidence.validate()?;
        let inj = &self.injection;
        check(
            "injection.always_include_threshold",
            inj.always_include_threshold,
            (0.0..=1.0).contains(&inj.always_include_threshold),
        )?;
        let obs = &self.observation;
        check("observation.reinforce_boost", obs.reinforce_boost, (0.0..=1.0).contains(&obs.reinforce_boost))?;
        check(
            "observation.similarity_threshold",
            obs.similarity_threshold,
            (0.0..=1.0).contains(&obs.similarity_threshold),
        )?;
        if obs.context_idle_hours < 1 {
            return Err(ValidationError::ParameterOutOfRange {
                name: "observation.context_idle_hours",
                value: obs.context_idle_hours as f32,
            });
        }
        check(
            "staleness.threshold_days",
            self.staleness.threshold_days,
            self.staleness.threshold_days >= 0.0,
        )?;
        for rule in &self.conflict_rules {
            check(
                "conflict_rules.min_overrider_confidence",
                rule.min_overrider_confidence,
                (0.0..=1.0).contains(&rule.min_overrider_confidence),
            )?;
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INSTINCT_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Ok(v) = std::env::var("INSTINCT_HALF_LIFE_DAYS") {
            if let Ok(n) = v.parse() {
                self.confidence.half_life_days = n;
            }
        }
        if let Ok(v) = std::env::var("INSTINCT_MIN_CONFIDENCE") {
            if let Ok(n) = v.parse() {
                self.confidence.min_confidence = n;
            }
        }
        if let Ok(v) = std::env::var("INSTINCT_MAX_INJECT") {
            if let Ok(n) = v.parse() {
                self.injection.max_inject = n;
            }
        }
        if let Ok(v) = std::env::var("INSTINCT_CHAR_BUDGET") {
            if let Ok(n) = v.parse() {
                self.injection.char_budget = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "instincts.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Hard cap on guidance entries per digest.
    pub max_inject: usize,
    /// Hard cap on characters across entries plus the emotional line.
    pub char_budget: usize,
    /// At or above this effective confidence the probabilistic gate is skipped.
    pub always_include_threshold: f32,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            max_inject: 6,
            char_budget: 1000,
            always_include_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Occurrences (current message included) before a repeat counts as a pattern.
    pub repetition_threshold: usize,
    /// User messages kept per context for repetition detection.
    pub history_window: usize,
    /// Base-confidence bump applied on each reinforcement.
    pub reinforce_boost: f32,
    /// Token-overlap ratio at which two messages count as the same request.
    pub similarity_threshold: f32,
    /// In-memory turn state (recent messages, last surfaced set) for a context
    /// is dropped after this many hours without a turn.
    pub context_idle_hours: i64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            repetition_threshold: 3,
            history_window: 20,
            reinforce_boost: 0.05,
            similarity_threshold: 0.8,
            context_idle_hours: 24,
        }
    }
}

impl ObservationConfig {
    pub fn context_idle_ttl(&self) -> chrono::Duration {
        // capped at a century so the conversion cannot overflow
        chrono::Duration::hours(self.context_idle_hours.clamp(1, 876_000))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub threshold_days: f32,
    /// Instincts seen at least this often are never cleaned up.
    pub exempt_occurrence: u32,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            threshold_days: 90.0,
            exempt_occurrence: 5,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
