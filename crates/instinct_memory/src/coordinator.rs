//! Behavior Engine - wires the store, tracker, observer and injector together
//!
//! One engine owns one database. The runtime calls:
//! - `on_turn` at every turn boundary, to learn from the user's message
//! - `guidance` before prompt assembly, to get the digest for this turn
//!
//! Between the two the engine remembers which instincts were surfaced, so
//! the next message can grade them.

use crate::conflict::ConflictResolver;
use crate::emotion::EmotionalStateTracker;
use crate::injector::{GuidanceDigest, GuidanceInjector, TurnContext};
use crate::observer::{Observation, ObservationPipeline};
use crate::sqlite::SqliteInstinctLog;
use crate::store::{system_time, InstinctStore, TimeSource};
use instinct_core::{validate_context_id, EngineConfig, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything the runtime knows at a turn boundary.
#[derive(Debug, Clone, Default)]
pub struct TurnBoundary {
    pub context_id: String,
    pub user_text: String,
    /// The agent's reply, when the boundary falls after it.
    pub agent_text: Option<String>,
    pub turn_context: TurnContext,
}

impl TurnBoundary {
    pub fn user(context_id: impl Into<String>, user_text: impl Into<String>) -> Self {
        let user_text = user_text.into();
        Self {
            context_id: context_id.into(),
            turn_context: TurnContext::new(user_text.clone()),
            user_text,
            agent_text: None,
        }
    }
}

pub struct BehaviorEngine {
    config: EngineConfig,
    store: Arc<InstinctStore>,
    tracker: Arc<EmotionalStateTracker>,
    observer: ObservationPipeline,
    injector: GuidanceInjector,

    /// Recent user messages per context, for repetition detection when the
    /// runtime does not supply its own history.
    history: RwLock<HashMap<String, RecentMessages>>,
}

#[derive(Default)]
struct RecentMessages {
    messages: VecDeque<String>,
    last_seen: Option<DateTime<Utc>>,
}

impl BehaviorEngine {
    /// Open (or create) the database named in `config.storage`.
    pub async fn open(config: &EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let log = SqliteInstinctLog::new(&config.storage.db_path).await?;
        tracing::info!("Behavior engine opened at {}", config.storage.db_path);
        Ok(Self::new(Arc::new(log), config))
    }

    pub fn new(log: Arc<SqliteInstinctLog>, config: &EngineConfig) -> Self {
        Self::with_clock(log, config, system_time())
    }

    pub fn with_clock(log: Arc<SqliteInstinctLog>, config: &EngineConfig, clock: TimeSource) -> Self {
        let store = Arc::new(InstinctStore::new(log.clone(), config).with_time_source(clock.clone()));
        let tracker = Arc::new(EmotionalStateTracker::new(log).with_time_source(clock));
        let observer = ObservationPipeline::new(store.clone(), tracker.clone(), config.observation.clone());
        let injector = GuidanceInjector::new(
            store.clone(),
            tracker.clone(),
            ConflictResolver::from_config(config),
            config.injection.clone(),
        );
        Self {
            config: config.clone(),
            store,
            tracker,
            observer,
            injector,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InstinctStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<EmotionalStateTracker> {
        &self.tracker
    }

    pub fn observer(&self) -> &ObservationPipeline {
        &self.observer
    }

    pub fn injector(&self) -> &GuidanceInjector {
        &self.injector
    }

    /// Learn from one turn. Runtime-supplied history wins over the engine's own.
    pub async fn on_turn(&self, turn: TurnBoundary) -> Result<Observation> {
        validate_context_id(&turn.context_id)?;
        if let Some(agent_text) = &turn.agent_text {
            tracing::trace!("Turn in '{}' closed by a {}-char reply", turn.context_id, agent_text.chars().count());
        }

        let now = self.store.now();
        let ttl = self.config.observation.context_idle_ttl();
        let history: Vec<String> = if turn.turn_context.history.is_empty() {
            let map = self.history.read().await;
            map.get(&turn.context_id)
                .filter(|h| h.last_seen.is_some_and(|seen| now - seen < ttl))
                .map(|h| h.messages.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            turn.turn_context.history.clone()
        };

        let observation = self.observer.detect(&turn.context_id, &turn.user_text, &history).await?;

        let window = self.config.observation.history_window.max(1);
        let mut map = self.history.write().await;
        map.retain(|_, h| h.last_seen.is_some_and(|seen| now - seen < ttl));
        let entry = map.entry(turn.context_id).or_default();
        entry.messages.push_back(turn.user_text);
        entry.last_seen = Some(now);
        while entry.messages.len() > window {
            entry.messages.pop_front();
        }

        Ok(observation)
    }

    /// Contexts whose recent messages are still held in memory.
    pub async fn tracked_contexts(&self) -> usize {
        self.history.read().await.len()
    }

    /// Build this turn's digest and remember what it surfaced.
    pub async fn guidance(
        &self,
        context_id: &str,
        turn: &TurnContext,
        rng: &mut dyn RngCore,
    ) -> Result<GuidanceDigest> {
        let digest = self.injector.build(context_id, turn, rng).await?;
        self.observer.mark_surfaced(context_id, &digest.applied);
        Ok(digest)
    }

    /// Disable stale instincts across every context.
    pub async fn cleanup_stale(&self) -> Result<usize> {
        self.store.cleanup_stale_all(self.config.staleness.threshold_days).await
    }
}
