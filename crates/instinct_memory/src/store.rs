//! Instinct Store
//!
//! Event-sourced storage of instincts, one log per context. Every mutation
//! follows the same path under the context's lock:
//!
//!   load snapshot (tail-replay) → compute events → append (commit point) → save snapshot
//!
//! The append is the only step that can fail an operation. A snapshot that is
//! missing, stale or corrupt is rebuilt from the log.

use crate::events::{InstinctEvent, Snapshot};
use crate::profiles;
use crate::sqlite::SqliteInstinctLog;
use crate::triggers::{trigger_matches, validate_trigger};
use chrono::{DateTime, Utc};
use instinct_core::{
    validate_context_id, ConfidenceModel, Domain, EngineConfig, Instinct, InstinctError,
    InstinctStatus, NewInstinct, Result, Source, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Injectable wall clock.
pub type TimeSource = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_time() -> TimeSource {
    Arc::new(Utc::now)
}

const LOCK_SWEEP_THRESHOLD: usize = 1024;

/// Advisory per-context locks. Contexts never contend with each other.
///
/// Once the map passes `sweep_threshold` entries, locks that nobody holds or
/// waits on are dropped. They carry no state and are recreated on demand.
pub struct ContextLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    sweep_threshold: usize,
}

impl Default for ContextLocks {
    fn default() -> Self {
        Self::with_sweep_threshold(LOCK_SWEEP_THRESHOLD)
    }
}

impl ContextLocks {
    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        Self { locks: Mutex::new(HashMap::new()), sweep_threshold }
    }

    pub async fn acquire(&self, context_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() >= self.sweep_threshold {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(context_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Query types
// ============================================================================

#[derive(Debug, Clone)]
pub struct ListFilter {
    /// `None` lists every status.
    pub status: Option<InstinctStatus>,
    pub domain: Option<Domain>,
    /// Applied to the (possibly decayed) confidence.
    pub min_confidence: Option<f32>,
    pub apply_decay: bool,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            status: Some(InstinctStatus::Active),
            domain: None,
            min_confidence: None,
            apply_decay: true,
        }
    }
}

impl ListFilter {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self { status: None, ..Self::default() }
    }

    pub fn in_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn min_confidence(mut self, min: f32) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn raw(mut self) -> Self {
        self.apply_decay = false;
        self
    }
}

/// An instinct together with the confidence it was listed under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredInstinct {
    #[serde(flatten)]
    pub instinct: Instinct,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstinctSummary {
    pub total: usize,
    pub active: usize,
    pub disabled: usize,
    pub by_domain: BTreeMap<Domain, usize>,
    /// Mean decayed confidence over active instincts, 0 when there are none.
    pub average_confidence: f32,
}

/// Portable form used by export and import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedInstinct {
    pub domain: String,
    pub trigger: String,
    pub action: String,
    pub source: String,
    pub confidence: f32,
    #[serde(default = "one")]
    pub occurrence_count: u32,
    #[serde(default)]
    pub success_rate: Option<f32>,
    #[serde(default)]
    pub status: Option<String>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFile {
    pub context_id: String,
    pub exported_at: DateTime<Utc>,
    pub instincts: Vec<ExportedInstinct>,
}

// ============================================================================
// Store
// ============================================================================

pub struct InstinctStore {
    log: Arc<SqliteInstinctLog>,
    model: ConfidenceModel,
    reinforce_boost: f32,
    exempt_occurrence: u32,
    clock: TimeSource,
    locks: ContextLocks,
}

impl InstinctStore {
    pub fn new(log: Arc<SqliteInstinctLog>, config: &EngineConfig) -> Self {
        Self {
            log,
            model: ConfidenceModel::new(config.confidence.clone()),
            reinforce_boost: config.observation.reinforce_boost,
            exempt_occurrence: config.staleness.exempt_occurrence,
            clock: system_time(),
            locks: ContextLocks::default(),
        }
    }

    pub fn with_time_source(mut self, clock: TimeSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn model(&self) -> &ConfidenceModel {
        &self.model
    }

    pub fn log(&self) -> &Arc<SqliteInstinctLog> {
        &self.log
    }

    // =========================================================================
    // Snapshot handling
    // =========================================================================

    /// Current view of a context, catching the stored snapshot up with the log.
    pub async fn snapshot(&self, context_id: &str) -> Result<Snapshot> {
        validate_context_id(context_id)?;
        self.load_state(context_id).await
    }

    /// Discard the stored snapshot and fold the whole log again.
    pub async fn rebuild_snapshot(&self, context_id: &str) -> Result<Snapshot> {
        validate_context_id(context_id)?;
        let _guard = self.locks.acquire(context_id).await;
        let events = self.log.events(context_id).await?;
        let snapshot = Snapshot::replay(context_id, &events);
        self.log.save_snapshot(&snapshot).await?;
        tracing::info!(
            "Rebuilt snapshot for '{}' from {} events ({} instincts)",
            context_id,
            events.len(),
            snapshot.len()
        );
        Ok(snapshot)
    }

    async fn load_state(&self, context_id: &str) -> Result<Snapshot> {
        match self.log.load_snapshot(context_id).await {
            Ok(Some(mut snapshot)) if snapshot.context_id == context_id => {
                let tail = self.log.events_after(context_id, snapshot.last_seq).await?;
                for record in &tail {
                    snapshot.apply(record.seq, &record.event);
                }
                Ok(snapshot)
            }
            Ok(Some(_)) => {
                tracing::warn!("Snapshot for '{}' belongs to another context, replaying log", context_id);
                self.replay_and_resave(context_id).await
            }
            Ok(None) => {
                let events = self.log.events(context_id).await?;
                Ok(Snapshot::replay(context_id, &events))
            }
            Err(e) => {
                tracing::warn!("Snapshot for '{}' unreadable ({:#}), replaying log", context_id, e);
                self.replay_and_resave(context_id).await
            }
        }
    }

    async fn replay_and_resave(&self, context_id: &str) -> Result<Snapshot> {
        let events = self.log.events(context_id).await?;
        let snapshot = Snapshot::replay(context_id, &events);
        if let Err(e) = self.log.save_snapshot(&snapshot).await {
            tracing::warn!("Failed to re-save snapshot for '{}': {:#}", context_id, e);
        }
        Ok(snapshot)
    }

    /// Run one read-modify-write cycle under the context lock.
    ///
    /// `plan` inspects the current snapshot and returns the events to append
    /// plus a value derived before the write. Nothing is written when it fails
    /// or returns no events.
    async fn mutate<T, F>(&self, context_id: &str, plan: F) -> Result<(Snapshot, T)>
    where
        F: FnOnce(&Snapshot, DateTime<Utc>) -> Result<(Vec<InstinctEvent>, T)>,
    {
        validate_context_id(context_id)?;
        let _guard = self.locks.acquire(context_id).await;
        let mut snapshot = self.load_state(context_id).await?;
        let now = self.now();
        let (events, value) = plan(&snapshot, now)?;
        if events.is_empty() {
            return Ok((snapshot, value));
        }

        let seqs = self.log.append(context_id, &events, now).await?;
        for (seq, event) in seqs.iter().zip(&events) {
            snapshot.apply(*seq, event);
        }
        if let Err(e) = self.log.save_snapshot(&snapshot).await {
            tracing::warn!("Snapshot save failed for '{}', log remains authoritative: {:#}", context_id, e);
        }
        Ok((snapshot, value))
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    pub async fn create(&self, context_id: &str, spec: NewInstinct) -> Result<Instinct> {
        spec.validate()?;
        validate_trigger(&spec.trigger)?;
        let initial_success_rate = self.model.params().initial_success_rate;
        let (snapshot, id) = self
            .mutate(context_id, |_, now| {
                let instinct = Instinct {
                    id: Uuid::new_v4(),
                    context_id: context_id.to_string(),
                    domain: spec.domain,
                    trigger: spec.trigger.trim().to_string(),
                    action: spec.action.trim().to_string(),
                    source: spec.source,
                    base_confidence: spec.confidence,
                    occurrence_count: 1,
                    success_rate: initial_success_rate,
                    last_triggered_at: now,
                    created_at: now,
                    updated_at: now,
                    status: InstinctStatus::Active,
                };
                let id = instinct.id;
                Ok((vec![InstinctEvent::Created { instinct }], id))
            })
            .await?;

        let created = found(&snapshot, context_id, id)?;
        tracing::info!(
            "Created instinct {} [{}] in '{}': {} -> {}",
            created.id,
            created.domain,
            context_id,
            created.trigger,
            created.action
        );
        Ok(created)
    }

    pub async fn get(&self, context_id: &str, id: Uuid) -> Result<Instinct> {
        let snapshot = self.snapshot(context_id).await?;
        found(&snapshot, context_id, id)
    }

    /// Instincts matching `filter`, highest confidence first.
    pub async fn list(&self, context_id: &str, filter: &ListFilter) -> Result<Vec<ScoredInstinct>> {
        let snapshot = self.snapshot(context_id).await?;
        let now = self.now();
        let mut out: Vec<ScoredInstinct> = snapshot
            .instincts
            .into_values()
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| filter.domain.map_or(true, |d| i.domain == d))
            .map(|instinct| {
                let confidence = if filter.apply_decay {
                    self.model.decayed(&instinct, now)
                } else {
                    instinct.base_confidence
                };
                ScoredInstinct { instinct, confidence }
            })
            .filter(|s| filter.min_confidence.map_or(true, |m| s.confidence >= m))
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.instinct.created_at.cmp(&b.instinct.created_at))
                .then_with(|| a.instinct.id.cmp(&b.instinct.id))
        });
        Ok(out)
    }

    /// Fire an instinct again: resets its staleness clock and bumps confidence.
    pub async fn reinforce(&self, context_id: &str, id: Uuid) -> Result<Instinct> {
        let boost = self.reinforce_boost;
        let (snapshot, _) = self
            .mutate(context_id, |snap, now| {
                let current = found_ref(snap, context_id, id)?;
                let confidence = self.model.clamp(current.base_confidence + boost);
                Ok((vec![InstinctEvent::Reinforced { id, at: now, confidence }], ()))
            })
            .await?;
        let updated = found(&snapshot, context_id, id)?;
        tracing::debug!(
            "Reinforced instinct {} (count {}, base {:.2})",
            id,
            updated.occurrence_count,
            updated.base_confidence
        );
        Ok(updated)
    }

    pub async fn adjust_confidence(&self, context_id: &str, id: Uuid, delta: f32) -> Result<Instinct> {
        if !delta.is_finite() {
            return Err(ValidationError::NonFiniteDelta.into());
        }
        let (snapshot, _) = self
            .mutate(context_id, |snap, now| {
                let current = found_ref(snap, context_id, id)?;
                let confidence = self.model.clamp(current.base_confidence + delta);
                Ok((vec![InstinctEvent::ConfidenceAdjusted { id, delta, confidence, at: now }], ()))
            })
            .await?;
        found(&snapshot, context_id, id)
    }

    /// Returns whether the status changed.
    pub async fn enable(&self, context_id: &str, id: Uuid) -> Result<bool> {
        let (_, changed) = self
            .mutate(context_id, |snap, now| {
                let current = found_ref(snap, context_id, id)?;
                if current.is_active() {
                    return Ok((vec![], false));
                }
                Ok((vec![InstinctEvent::Enabled { id, at: now }], true))
            })
            .await?;
        Ok(changed)
    }

    /// Returns whether the status changed.
    pub async fn disable(&self, context_id: &str, id: Uuid, reason: &str) -> Result<bool> {
        let (_, changed) = self
            .mutate(context_id, |snap, now| {
                let current = found_ref(snap, context_id, id)?;
                if !current.is_active() {
                    return Ok((vec![], false));
                }
                Ok((
                    vec![InstinctEvent::Disabled { id, at: now, reason: reason.to_string() }],
                    true,
                ))
            })
            .await?;
        Ok(changed)
    }

    /// One EMA step of `success_rate` toward the observed outcome.
    pub async fn record_outcome(&self, context_id: &str, id: Uuid, success: bool) -> Result<Instinct> {
        let (snapshot, previous) = self
            .mutate(context_id, |snap, now| {
                let current = found_ref(snap, context_id, id)?;
                let success_rate = self.model.update_success_rate(current.success_rate, success);
                Ok((
                    vec![InstinctEvent::OutcomeRecorded { id, success, success_rate, at: now }],
                    current.success_rate,
                ))
            })
            .await?;
        let updated = found(&snapshot, context_id, id)?;
        tracing::debug!(
            "Recorded outcome for instinct: {} | success_rate: {:.2} -> {:.2} | {}",
            success,
            previous,
            updated.success_rate,
            updated.action
        );
        Ok(updated)
    }

    /// Apply one outcome to several instincts in a single append. Unknown ids are skipped.
    pub async fn record_outcomes(&self, context_id: &str, ids: &[Uuid], success: bool) -> Result<usize> {
        let (_, count) = self
            .mutate(context_id, |snap, now| {
                let events: Vec<InstinctEvent> = ids
                    .iter()
                    .filter_map(|id| snap.get(id))
                    .map(|current| InstinctEvent::OutcomeRecorded {
                        id: current.id,
                        success,
                        success_rate: self.model.update_success_rate(current.success_rate, success),
                        at: now,
                    })
                    .collect();
                let count = events.len();
                Ok((events, count))
            })
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    fn is_stale(&self, instinct: &Instinct, threshold_days: f32, now: DateTime<Utc>) -> bool {
        instinct.is_active()
            && instinct.occurrence_count < self.exempt_occurrence
            && instinct.days_since_trigger(now) >= threshold_days
    }

    pub async fn get_stale(&self, context_id: &str, threshold_days: f32) -> Result<Vec<Instinct>> {
        let snapshot = self.snapshot(context_id).await?;
        let now = self.now();
        Ok(snapshot
            .instincts
            .into_values()
            .filter(|i| self.is_stale(i, threshold_days, now))
            .collect())
    }

    /// Disable stale instincts. Running it twice disables nothing the second time.
    pub async fn cleanup_stale(&self, context_id: &str, threshold_days: f32) -> Result<usize> {
        let (_, count) = self
            .mutate(context_id, |snap, now| {
                let reason = format!("stale: not triggered for {} days", threshold_days);
                let events: Vec<InstinctEvent> = snap
                    .active()
                    .filter(|i| self.is_stale(i, threshold_days, now))
                    .map(|i| InstinctEvent::Disabled { id: i.id, at: now, reason: reason.clone() })
                    .collect();
                let count = events.len();
                Ok((events, count))
            })
            .await?;
        if count > 0 {
            tracing::info!("Disabled {} stale instincts in '{}'", count, context_id);
        }
        Ok(count)
    }

    pub async fn cleanup_stale_all(&self, threshold_days: f32) -> Result<usize> {
        let mut total = 0;
        for context_id in self.log.contexts().await? {
            total += self.cleanup_stale(&context_id, threshold_days).await?;
        }
        tracing::info!("Stale cleanup finished: {} instincts disabled", total);
        Ok(total)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Active instincts whose trigger matches `text`, by decayed confidence.
    pub async fn applicable(&self, context_id: &str, text: &str, max_count: usize) -> Result<Vec<ScoredInstinct>> {
        let mut matching: Vec<ScoredInstinct> = self
            .list(context_id, &ListFilter::active())
            .await?
            .into_iter()
            .filter(|s| trigger_matches(&s.instinct.trigger, text))
            .collect();
        matching.truncate(max_count);
        Ok(matching)
    }

    pub async fn summary(&self, context_id: &str) -> Result<InstinctSummary> {
        let snapshot = self.snapshot(context_id).await?;
        let now = self.now();
        let mut by_domain = BTreeMap::new();
        let mut active = 0;
        let mut confidence_sum = 0.0;
        for instinct in snapshot.instincts.values() {
            *by_domain.entry(instinct.domain).or_insert(0) += 1;
            if instinct.is_active() {
                active += 1;
                confidence_sum += self.model.decayed(instinct, now);
            }
        }
        Ok(InstinctSummary {
            total: snapshot.len(),
            active,
            disabled: snapshot.len() - active,
            by_domain,
            average_confidence: if active > 0 { confidence_sum / active as f32 } else { 0.0 },
        })
    }

    // =========================================================================
    // Import / export / profiles
    // =========================================================================

    pub async fn export(&self, context_id: &str) -> Result<String> {
        let snapshot = self.snapshot(context_id).await?;
        let file = ExportFile {
            context_id: context_id.to_string(),
            exported_at: self.now(),
            instincts: snapshot
                .instincts
                .values()
                .map(|i| ExportedInstinct {
                    domain: i.domain.as_str().to_string(),
                    trigger: i.trigger.clone(),
                    action: i.action.clone(),
                    source: i.source.as_str().to_string(),
                    confidence: i.base_confidence,
                    occurrence_count: i.occurrence_count,
                    success_rate: Some(i.success_rate),
                    status: Some(i.status.as_str().to_string()),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file)
            .map_err(|e| InstinctError::Storage(anyhow::Error::new(e).context("Failed to serialize export")))
    }

    /// Import instincts under fresh ids. Accepts an export file or a bare array.
    /// Every record is validated before anything is written.
    pub async fn import(&self, context_id: &str, json: &str) -> Result<usize> {
        let records = parse_import(json)?;
        let initial_success_rate = self.model.params().initial_success_rate;
        let mut prepared = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            let spec = NewInstinct::parse(
                &record.domain,
                &record.trigger,
                &record.action,
                &record.source,
                record.confidence,
            )
            .and_then(|spec| validate_trigger(&spec.trigger).map(|_| spec))
            .map_err(|e| ValidationError::MalformedImport(format!("record {}: {}", idx, e)))?;
            let status: InstinctStatus = match &record.status {
                Some(s) => s.parse()?,
                None => InstinctStatus::Active,
            };
            let success_rate = match record.success_rate {
                Some(r) if r.is_finite() && (0.0..=1.0).contains(&r) => r,
                Some(r) => {
                    return Err(ValidationError::MalformedImport(format!(
                        "record {}: success_rate {} outside [0, 1]",
                        idx, r
                    ))
                    .into())
                }
                None => initial_success_rate,
            };
            prepared.push((spec, record.occurrence_count.max(1), success_rate, status));
        }

        let (_, count) = self
            .mutate(context_id, |_, now| {
                let events: Vec<InstinctEvent> = prepared
                    .into_iter()
                    .map(|(spec, occurrence_count, success_rate, status)| InstinctEvent::Created {
                        instinct: Instinct {
                            id: Uuid::new_v4(),
                            context_id: context_id.to_string(),
                            domain: spec.domain,
                            trigger: spec.trigger.trim().to_string(),
                            action: spec.action.trim().to_string(),
                            source: Source::Imported,
                            base_confidence: spec.confidence,
                            occurrence_count,
                            success_rate,
                            last_triggered_at: now,
                            created_at: now,
                            updated_at: now,
                            status,
                        },
                    })
                    .collect();
                let count = events.len();
                Ok((events, count))
            })
            .await?;
        tracing::info!("Imported {} instincts into '{}'", count, context_id);
        Ok(count)
    }

    /// Seed a context from a preset. Returns the number of instincts created.
    pub async fn apply_profile(&self, context_id: &str, profile_id: &str, clear_existing: bool) -> Result<usize> {
        let profile =
            profiles::find(profile_id).ok_or_else(|| InstinctError::UnknownProfile(profile_id.to_string()))?;
        let specs = profile.instincts();
        let initial_success_rate = self.model.params().initial_success_rate;

        let (_, created) = self
            .mutate(context_id, |snap, now| {
                let mut events = Vec::new();
                if clear_existing {
                    let reason = format!("replaced by profile {}", profile.id);
                    events.extend(
                        snap.active()
                            .map(|i| InstinctEvent::Disabled { id: i.id, at: now, reason: reason.clone() }),
                    );
                }
                let created = specs.len();
                events.extend(specs.into_iter().map(|spec| InstinctEvent::Created {
                    instinct: Instinct {
                        id: Uuid::new_v4(),
                        context_id: context_id.to_string(),
                        domain: spec.domain,
                        trigger: spec.trigger,
                        action: spec.action,
                        source: spec.source,
                        base_confidence: spec.confidence,
                        occurrence_count: 1,
                        success_rate: initial_success_rate,
                        last_triggered_at: now,
                        created_at: now,
                        updated_at: now,
                        status: InstinctStatus::Active,
                    },
                }));
                Ok((events, created))
            })
            .await?;
        tracing::info!("Applied profile '{}' to '{}' ({} instincts)", profile.id, context_id, created);
        Ok(created)
    }
}

fn found_ref<'a>(snapshot: &'a Snapshot, context_id: &str, id: Uuid) -> Result<&'a Instinct> {
    snapshot.get(&id).ok_or_else(|| InstinctError::NotFound {
        context_id: context_id.to_string(),
        id,
    })
}

fn found(snapshot: &Snapshot, context_id: &str, id: Uuid) -> Result<Instinct> {
    found_ref(snapshot, context_id, id).cloned()
}

fn parse_import(json: &str) -> Result<Vec<ExportedInstinct>> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ValidationError::MalformedImport(e.to_string()))?;
    let records = if value.is_array() {
        serde_json::from_value::<Vec<ExportedInstinct>>(value)
    } else {
        serde_json::from_value::<ExportFile>(value).map(|f| f.instincts)
    };
    Ok(records.map_err(|e| ValidationError::MalformedImport(e.to_string()))?)
}
