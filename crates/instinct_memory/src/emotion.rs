//! Persisted emotional state per context.
//!
//! Classification and the edge table live in `instinct_limbic`; this layer
//! adds the stored `(state, entered_at)` row.

use crate::sqlite::SqliteInstinctLog;
use crate::store::{system_time, ContextLocks, TimeSource};
use chrono::{DateTime, Utc};
use instinct_core::{validate_context_id, EmotionalState, Result};
use instinct_limbic::{decide, TransitionOutcome};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionalReading {
    pub state: EmotionalState,
    /// `None` until the context first leaves NEUTRAL.
    pub entered_at: Option<DateTime<Utc>>,
}

pub struct EmotionalStateTracker {
    log: Arc<SqliteInstinctLog>,
    clock: TimeSource,
    locks: ContextLocks,
}

impl EmotionalStateTracker {
    pub fn new(log: Arc<SqliteInstinctLog>) -> Self {
        Self {
            log,
            clock: system_time(),
            locks: ContextLocks::default(),
        }
    }

    pub fn with_time_source(mut self, clock: TimeSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn classify(&self, text: &str) -> Option<EmotionalState> {
        instinct_limbic::classify(text)
    }

    pub fn guidance(&self, state: EmotionalState) -> Option<&'static str> {
        instinct_limbic::guidance(state)
    }

    pub async fn reading(&self, context_id: &str) -> Result<EmotionalReading> {
        validate_context_id(context_id)?;
        Ok(match self.log.load_emotional_state(context_id).await? {
            Some((state, entered_at)) => EmotionalReading { state, entered_at: Some(entered_at) },
            None => EmotionalReading { state: EmotionalState::Neutral, entered_at: None },
        })
    }

    pub async fn current(&self, context_id: &str) -> Result<EmotionalState> {
        Ok(self.reading(context_id).await?.state)
    }

    /// Move to `candidate` if the edge is allowed. Only a move is persisted.
    pub async fn transition(
        &self,
        context_id: &str,
        candidate: Option<EmotionalState>,
    ) -> Result<TransitionOutcome> {
        validate_context_id(context_id)?;
        let _guard = self.locks.acquire(context_id).await;
        let current = self.current(context_id).await?;
        let outcome = decide(current, candidate);
        if let TransitionOutcome::Moved { from, to } = outcome {
            self.log.save_emotional_state(context_id, to, (self.clock)()).await?;
            tracing::info!("Emotional state for '{}': {} -> {}", context_id, from, to);
        }
        Ok(outcome)
    }

    /// Classify a user message and transition on the result.
    pub async fn observe(&self, context_id: &str, text: &str) -> Result<TransitionOutcome> {
        self.transition(context_id, self.classify(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instinct_limbic::HoldReason;

    async fn tracker() -> EmotionalStateTracker {
        let log = Arc::new(SqliteInstinctLog::new(":memory:").await.unwrap());
        EmotionalStateTracker::new(log)
    }

    #[tokio::test]
    async fn test_initial_state_is_neutral() {
        let t = tracker().await;
        let r = t.reading("ctx").await.unwrap();
        assert_eq!(r.state, EmotionalState::Neutral);
        assert!(r.entered_at.is_none());
    }

    #[tokio::test]
    async fn test_engaged_then_frustrated() {
        let t = tracker().await;
        let first = t.observe("ctx", "sounds good, keep going").await.unwrap();
        assert_eq!(first, TransitionOutcome::Moved { from: EmotionalState::Neutral, to: EmotionalState::Engaged });

        let second = t.observe("ctx", "nevermind, forget it").await.unwrap();
        assert_eq!(second.state(), EmotionalState::Frustrated);
        assert!(t.guidance(second.state()).unwrap().contains("supportive"));

        let r = t.reading("ctx").await.unwrap();
        assert_eq!(r.state, EmotionalState::Frustrated);
        assert!(r.entered_at.is_some());
    }

    #[tokio::test]
    async fn test_disallowed_edge_holds_and_persists_nothing() {
        let t = tracker().await;
        t.transition("ctx", Some(EmotionalState::Satisfied)).await.unwrap();
        let out = t.transition("ctx", Some(EmotionalState::Frustrated)).await.unwrap();
        assert_eq!(
            out,
            TransitionOutcome::Held { state: EmotionalState::Satisfied, reason: HoldReason::Disallowed }
        );
        assert_eq!(t.current("ctx").await.unwrap(), EmotionalState::Satisfied);
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let t = tracker().await;
        t.transition("a", Some(EmotionalState::Urgent)).await.unwrap();
        assert_eq!(t.current("a").await.unwrap(), EmotionalState::Urgent);
        assert_eq!(t.current("b").await.unwrap(), EmotionalState::Neutral);
    }

    #[tokio::test]
    async fn test_blank_context_rejected() {
        let t = tracker().await;
        assert!(t.current(" ").await.unwrap_err().is_validation());
    }
}
