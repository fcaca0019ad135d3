//! Guidance Injector
//!
//! Read-only projection of a context's instincts and mood into a small,
//! size-bounded digest for the prompt assembler. Nothing here writes state.

use crate::conflict::{Candidate, ConflictResolver};
use crate::emotion::EmotionalStateTracker;
use crate::store::{InstinctStore, ListFilter};
use crate::triggers::trigger_matches;
use chrono::{DateTime, Utc};
use instinct_core::config::InjectionConfig;
use instinct_core::{ConfidenceModel, Domain, EmotionalState, Instinct, Result};
use rand::{Rng, RngCore};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What the current turn is about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnContext {
    pub text: String,
    /// Recent user messages supplied by the runtime, oldest first.
    pub history: Vec<String>,
}

impl TurnContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), history: Vec::new() }
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidanceEntry {
    pub id: Uuid,
    pub domain: Domain,
    pub text: String,
    pub effective: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuidanceDigest {
    pub entries: Vec<GuidanceEntry>,
    pub emotional_line: Option<String>,
    /// Ids of the instincts that made it into the digest, in rank order.
    pub applied: Vec<Uuid>,
}

impl GuidanceDigest {
    /// Characters counted against the budget.
    pub fn char_count(&self) -> usize {
        self.entries.iter().map(|e| e.text.chars().count()).sum::<usize>()
            + self.emotional_line.as_ref().map_or(0, |l| l.chars().count())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.emotional_line.is_none()
    }

    /// Markdown block grouped under domain headings.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Behavioral Guidance\n");
        if let Some(line) = &self.emotional_line {
            out.push('\n');
            out.push_str(line);
            out.push('\n');
        }
        for domain in Domain::ALL {
            let mut lines = self.entries.iter().filter(|e| e.domain == domain).peekable();
            if lines.peek().is_none() {
                continue;
            }
            out.push_str(&format!("\n### {}\n", domain.heading()));
            for entry in lines {
                out.push_str(&format!("- {}\n", entry.text));
            }
        }
        out
    }
}

/// Tiered phrasing: strong instincts are stated as rules, weak ones keep their condition.
pub fn format_entry(instinct: &Instinct, effective: f32) -> String {
    if effective >= 0.8 {
        format!("{} (always apply)", instinct.action)
    } else if effective >= 0.6 {
        instinct.action.clone()
    } else {
        format!("{} (when: {})", instinct.action, instinct.trigger)
    }
}

pub struct GuidanceInjector {
    store: Arc<InstinctStore>,
    tracker: Arc<EmotionalStateTracker>,
    resolver: ConflictResolver,
    config: InjectionConfig,
}

impl GuidanceInjector {
    pub fn new(
        store: Arc<InstinctStore>,
        tracker: Arc<EmotionalStateTracker>,
        resolver: ConflictResolver,
        config: InjectionConfig,
    ) -> Self {
        Self { store, tracker, resolver, config }
    }

    pub async fn build(
        &self,
        context_id: &str,
        turn: &TurnContext,
        rng: &mut dyn RngCore,
    ) -> Result<GuidanceDigest> {
        let instincts: Vec<Instinct> = self
            .store
            .list(context_id, &ListFilter::active())
            .await?
            .into_iter()
            .map(|s| s.instinct)
            .collect();
        let state = self.tracker.current(context_id).await?;
        Ok(compose(
            instincts,
            state,
            &turn.text,
            self.store.now(),
            self.store.model(),
            &self.resolver,
            &self.config,
            rng,
        ))
    }
}

/// The pure part of `build`: match, score, gate, resolve, pack.
#[allow(clippy::too_many_arguments)]
pub fn compose(
    instincts: Vec<Instinct>,
    state: EmotionalState,
    text: &str,
    now: DateTime<Utc>,
    model: &ConfidenceModel,
    resolver: &ConflictResolver,
    config: &InjectionConfig,
    rng: &mut dyn RngCore,
) -> GuidanceDigest {
    let mut candidates: Vec<Candidate> = instincts
        .into_iter()
        .filter(|i| i.is_active() && trigger_matches(&i.trigger, text))
        .map(|i| {
            let effective = model.effective(&i, now);
            Candidate::new(i, effective)
        })
        .collect();
    // gate in a stable order so a seeded rng gives a reproducible digest
    candidates.sort_by(|a, b| a.instinct.id.cmp(&b.instinct.id));
    let gated: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.effective >= config.always_include_threshold || rng.gen::<f32>() < c.effective)
        .collect();

    let resolved = resolver.resolve_ranked(gated);

    let mut digest = GuidanceDigest::default();
    let mut used = 0usize;
    if let Some(line) = instinct_limbic::guidance_line(state) {
        let n = line.chars().count();
        if n <= config.char_budget {
            used += n;
            digest.emotional_line = Some(line);
        }
    }

    for candidate in resolved {
        if digest.entries.len() >= config.max_inject {
            break;
        }
        let text = format_entry(&candidate.instinct, candidate.effective);
        let n = text.chars().count();
        if used + n > config.char_budget {
            tracing::debug!("Guidance entry skipped, {} chars over budget", used + n - config.char_budget);
            continue;
        }
        used += n;
        digest.applied.push(candidate.instinct.id);
        digest.entries.push(GuidanceEntry {
            id: candidate.instinct.id,
            domain: candidate.instinct.domain,
            text,
            effective: candidate.effective,
        });
    }
    digest
}
