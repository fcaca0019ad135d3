//! Instinct events and the snapshot fold.
//!
//! The event log is the source of truth. A snapshot is only a cache: it is
//! whatever you get by applying every event of a context in sequence order.
//! Events record post-computation values so the fold never re-runs the
//! confidence model.

use chrono::{DateTime, Utc};
use instinct_core::{Instinct, InstinctStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstinctEvent {
    Created {
        instinct: Instinct,
    },
    Reinforced {
        id: Uuid,
        at: DateTime<Utc>,
        /// Base confidence after the reinforcement boost.
        confidence: f32,
    },
    ConfidenceAdjusted {
        id: Uuid,
        delta: f32,
        confidence: f32,
        at: DateTime<Utc>,
    },
    OutcomeRecorded {
        id: Uuid,
        success: bool,
        success_rate: f32,
        at: DateTime<Utc>,
    },
    Enabled {
        id: Uuid,
        at: DateTime<Utc>,
    },
    Disabled {
        id: Uuid,
        at: DateTime<Utc>,
        reason: String,
    },
}

impl InstinctEvent {
    pub fn instinct_id(&self) -> Uuid {
        match self {
            InstinctEvent::Created { instinct } => instinct.id,
            InstinctEvent::Reinforced { id, .. }
            | InstinctEvent::ConfidenceAdjusted { id, .. }
            | InstinctEvent::OutcomeRecorded { id, .. }
            | InstinctEvent::Enabled { id, .. }
            | InstinctEvent::Disabled { id, .. } => *id,
        }
    }

    /// Value of the `event_type` column.
    pub fn event_type(&self) -> &'static str {
        match self {
            InstinctEvent::Created { .. } => "created",
            InstinctEvent::Reinforced { .. } => "reinforced",
            InstinctEvent::ConfidenceAdjusted { .. } => "confidence_adjusted",
            InstinctEvent::OutcomeRecorded { .. } => "outcome_recorded",
            InstinctEvent::Enabled { .. } => "enabled",
            InstinctEvent::Disabled { .. } => "disabled",
        }
    }
}

/// One row of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub seq: i64,
    pub context_id: String,
    pub event: InstinctEvent,
    pub recorded_at: DateTime<Utc>,
}

/// Materialized view of one context's log up to `last_seq`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub context_id: String,
    pub last_seq: i64,
    pub instincts: BTreeMap<Uuid, Instinct>,
}

impl Snapshot {
    pub fn empty(context_id: &str) -> Self {
        Self {
            context_id: context_id.to_string(),
            last_seq: 0,
            instincts: BTreeMap::new(),
        }
    }

    /// Fold a full event sequence from scratch.
    pub fn replay(context_id: &str, records: &[EventRecord]) -> Self {
        let mut snapshot = Self::empty(context_id);
        for record in records {
            snapshot.apply(record.seq, &record.event);
        }
        snapshot
    }

    /// Apply one event. Events for unknown ids are skipped with a warning.
    pub fn apply(&mut self, seq: i64, event: &InstinctEvent) {
        self.last_seq = self.last_seq.max(seq);

        if let InstinctEvent::Created { instinct } = event {
            self.instincts
                .entry(instinct.id)
                .or_insert_with(|| instinct.clone());
            return;
        }

        let id = event.instinct_id();
        let Some(instinct) = self.instincts.get_mut(&id) else {
            tracing::warn!(
                "Event {} (seq {}) references unknown instinct {} in context '{}'",
                event.event_type(),
                seq,
                id,
                self.context_id
            );
            return;
        };

        match event {
            InstinctEvent::Created { .. } => {}
            InstinctEvent::Reinforced { at, confidence, .. } => {
                instinct.occurrence_count = instinct.occurrence_count.saturating_add(1);
                instinct.last_triggered_at = *at;
                instinct.base_confidence = *confidence;
                instinct.updated_at = *at;
            }
            InstinctEvent::ConfidenceAdjusted { confidence, at, .. } => {
                instinct.base_confidence = *confidence;
                instinct.updated_at = *at;
            }
            InstinctEvent::OutcomeRecorded { success_rate, at, .. } => {
                instinct.success_rate = *success_rate;
                instinct.updated_at = *at;
            }
            InstinctEvent::Enabled { at, .. } => {
                instinct.status = InstinctStatus::Active;
                instinct.updated_at = *at;
            }
            InstinctEvent::Disabled { at, .. } => {
                instinct.status = InstinctStatus::Disabled;
                instinct.updated_at = *at;
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&Instinct> {
        self.instincts.get(id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Instinct> {
        self.instincts.values().filter(|i| i.is_active())
    }

    pub fn len(&self) -> usize {
        self.instincts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instincts.is_empty()
    }
}
