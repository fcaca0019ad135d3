//! Confidence Model
//!
//! Pure functions that turn a stored instinct into the number used for
//! ranking and injection. Three factors are combined:
//! - staleness: half-life decay since the last trigger, floored at `min_confidence`
//! - frequency: a small bonus once an instinct has been reinforced often
//! - success: a multiplier from the satisfaction EMA, neutral at 0.5

use crate::error::ValidationError;
use crate::types::Instinct;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tunable constants. Defaults follow the reference tuning but nothing
/// depends on their exact values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceParams {
    pub half_life_days: f32,
    pub min_confidence: f32,
    /// Instincts seen this many times stop decaying and earn the frequency bonus.
    pub reinforced_threshold: u32,
    pub frequency_step: f32,
    pub frequency_cap: f32,
    /// success_rate that maps to a multiplier of exactly 1.0
    pub success_pivot: f32,
    pub success_floor: f32,
    pub success_ceiling: f32,
    /// EMA learning rate for outcome signals
    pub ema_alpha: f32,
    /// Prior success_rate for new instincts
    pub initial_success_rate: f32,
}

impl Default for ConfidenceParams {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            min_confidence: 0.3,
            reinforced_threshold: 5,
            frequency_step: 0.03,
            frequency_cap: 0.15,
            success_pivot: 0.5,
            success_floor: 0.5,
            success_ceiling: 1.5,
            ema_alpha: 0.2,
            initial_success_rate: 0.5,
        }
    }
}

impl ConfidenceParams {
    /// Reject values that would make the model meaningless.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check("confidence.half_life_days", self.half_life_days, self.half_life_days > 0.0)?;
        check(
            "confidence.min_confidence",
            self.min_confidence,
            (0.0..=1.0).contains(&self.min_confidence),
        )?;
        check("confidence.frequency_step", self.frequency_step, self.frequency_step >= 0.0)?;
        check("confidence.frequency_cap", self.frequency_cap, self.frequency_cap >= 0.0)?;
        check("confidence.success_pivot", self.success_pivot, self.success_pivot > 0.0)?;
        check("confidence.success_floor", self.success_floor, self.success_floor >= 0.0)?;
        check(
            "confidence.success_ceiling",
            self.success_ceiling,
            self.success_ceiling >= self.success_floor,
        )?;
        check("confidence.ema_alpha", self.ema_alpha, (0.0..=1.0).contains(&self.ema_alpha))?;
        check(
            "confidence.initial_success_rate",
            self.initial_success_rate,
            (0.0..=1.0).contains(&self.initial_success_rate),
        )
    }
}

/// `ok` is only consulted for finite values.
pub(crate) fn check(name: &'static str, value: f32, ok: bool) -> Result<(), ValidationError> {
    if value.is_finite() && ok {
        Ok(())
    } else {
        Err(ValidationError::ParameterOutOfRange { name, value })
    }
}

/// Per-factor view of one effective-confidence computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub base: f32,
    pub decayed: f32,
    pub frequency_boost: f32,
    pub success_multiplier: f32,
    pub effective: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceModel {
    params: ConfidenceParams,
}

impl ConfidenceModel {
    pub fn new(params: ConfidenceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ConfidenceParams {
        &self.params
    }

    pub fn min_confidence(&self) -> f32 {
        self.params.min_confidence
    }

    /// Clamp into `[min_confidence, 1.0]`. NaN collapses to the floor.
    ///
    /// Unlike `f32::clamp` this never panics, even for params that skipped
    /// `validate` (the upper bound wins).
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.params.min_confidence.min(1.0);
        }
        value.max(self.params.min_confidence).min(1.0)
    }

    /// Half-life decay. Reinforced instincts (count ≥ threshold) keep their base.
    pub fn decay(&self, base_confidence: f32, occurrence_count: u32, days: f32) -> f32 {
        if occurrence_count >= self.params.reinforced_threshold {
            return self.clamp(base_confidence);
        }
        let days = if days.is_finite() { days.max(0.0) } else { 0.0 };
        let half_life = self.params.half_life_days.max(f32::EPSILON);
        let raw = base_confidence * 0.5f32.powf(days / half_life);
        self.clamp(raw.max(self.params.min_confidence))
    }

    /// Read-time decayed confidence for a stored instinct.
    pub fn decayed(&self, instinct: &Instinct, now: DateTime<Utc>) -> f32 {
        self.decay(
            instinct.base_confidence,
            instinct.occurrence_count,
            instinct.days_since_trigger(now),
        )
    }

    pub fn frequency_boost(&self, occurrence_count: u32) -> f32 {
        if occurrence_count >= self.params.reinforced_threshold {
            (occurrence_count as f32 * self.params.frequency_step).min(self.params.frequency_cap)
        } else {
            0.0
        }
    }

    pub fn success_multiplier(&self, success_rate: f32) -> f32 {
        let pivot = self.params.success_pivot.max(f32::EPSILON);
        let ratio = if success_rate.is_finite() { success_rate / pivot } else { 1.0 };
        ratio.max(self.params.success_floor).min(self.params.success_ceiling)
    }

    pub fn breakdown(&self, instinct: &Instinct, now: DateTime<Utc>) -> ConfidenceBreakdown {
        let decayed = self.decayed(instinct, now);
        let frequency_boost = self.frequency_boost(instinct.occurrence_count);
        let success_multiplier = self.success_multiplier(instinct.success_rate);
        let effective = self.clamp((decayed + frequency_boost) * success_multiplier);
        ConfidenceBreakdown {
            base: instinct.base_confidence,
            decayed,
            frequency_boost,
            success_multiplier,
            effective,
        }
    }

    /// Effective confidence used by conflict resolution and injection.
    pub fn effective(&self, instinct: &Instinct, now: DateTime<Utc>) -> f32 {
        let b = self.breakdown(instinct, now);
        if (b.effective - b.base).abs() > 0.1 {
            tracing::debug!(
                "Confidence adjustment: {:.2} -> {:.2} (decayed:{:.2}, freq:+{:.2}, success:x{:.2}) | {}",
                b.base,
                b.effective,
                b.decayed,
                b.frequency_boost,
                b.success_multiplier,
                truncate(&instinct.action, 50)
            );
        }
        b.effective
    }

    /// One EMA step toward 1.0 (success) or 0.0 (failure), kept in [0, 1].
    pub fn update_success_rate(&self, current: f32, success: bool) -> f32 {
        let signal = if success { 1.0 } else { 0.0 };
        let alpha = self.params.ema_alpha.clamp(0.0, 1.0);
        let current = if current.is_finite() { current.clamp(0.0, 1.0) } else { self.params.initial_success_rate };
        (alpha * signal + (1.0 - alpha) * current).clamp(0.0, 1.0)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
