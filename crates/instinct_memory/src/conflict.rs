//! Conflict Resolver
//!
//! Given the instincts that want to speak this turn, drop the ones a
//! higher-priority instinct overrides. Each rule runs once, so a cycle in
//! the rule table cannot make resolution loop.

use instinct_core::{default_rules, ConflictRule, EngineConfig, Instinct};
use std::cmp::Ordering;

/// An instinct scored for this turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub instinct: Instinct,
    pub effective: f32,
}

impl Candidate {
    pub fn new(instinct: Instinct, effective: f32) -> Self {
        Self { instinct, effective }
    }
}

/// Total order: effective desc, occurrences desc, most recently triggered first, id.
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.effective
        .total_cmp(&a.effective)
        .then_with(|| b.instinct.occurrence_count.cmp(&a.instinct.occurrence_count))
        .then_with(|| b.instinct.last_triggered_at.cmp(&a.instinct.last_triggered_at))
        .then_with(|| a.instinct.id.cmp(&b.instinct.id))
}

pub struct ConflictResolver {
    rules: Vec<ConflictRule>,
    max_inject: usize,
}

impl ConflictResolver {
    pub fn new(rules: Vec<ConflictRule>, max_inject: usize) -> Self {
        warn_on_cycles(&rules);
        Self { rules, max_inject }
    }

    pub fn with_defaults(max_inject: usize) -> Self {
        Self::new(default_rules(), max_inject)
    }

    /// Built-in rules followed by any configured extras.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut rules = default_rules();
        rules.extend(config.conflict_rules.iter().cloned());
        tracing::info!(
            "Loaded {} conflict rules ({} from config)",
            rules.len(),
            config.conflict_rules.len()
        );
        Self::new(rules, config.injection.max_inject)
    }

    pub fn rules(&self) -> &[ConflictRule] {
        &self.rules
    }

    pub fn max_inject(&self) -> usize {
        self.max_inject
    }

    /// Survivors in rank order, capped at `max_inject`.
    pub fn resolve(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut kept = self.resolve_ranked(candidates);
        kept.truncate(self.max_inject);
        kept
    }

    /// Every survivor in rank order. The injector packs from this list so an
    /// entry dropped for size can be replaced by a shorter lower-ranked one.
    pub fn resolve_ranked(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(rank_order);
        let n = candidates.len();
        let mut alive = vec![true; n];

        for rule in &self.rules {
            for i in (0..n).rev() {
                if !alive[i] || !rule.is_overridden(&candidates[i].instinct) {
                    continue;
                }
                let winner = (0..n).find(|&j| {
                    j != i
                        && alive[j]
                        && rule.is_overrider(&candidates[j].instinct, candidates[j].effective)
                        // in a mutual override the higher-ranked side survives
                        && !(i < j && self.overrides(&candidates[i], &candidates[j]))
                });
                if let Some(j) = winner {
                    alive[i] = false;
                    tracing::debug!(
                        "Conflict resolved by '{}': \"{}\" ({:.2}) overrides \"{}\" ({:.2})",
                        rule.name,
                        candidates[j].instinct.action,
                        candidates[j].effective,
                        candidates[i].instinct.action,
                        candidates[i].effective
                    );
                }
            }
        }

        candidates
            .into_iter()
            .zip(alive)
            .filter_map(|(c, keep)| keep.then_some(c))
            .collect()
    }

    /// Whether some rule lets `a` remove `b`.
    fn overrides(&self, a: &Candidate, b: &Candidate) -> bool {
        self.rules
            .iter()
            .any(|r| r.is_overridden(&b.instinct) && r.is_overrider(&a.instinct, a.effective))
    }
}

/// Warn about rules that can override each other, or themselves.
fn warn_on_cycles(rules: &[ConflictRule]) {
    let beats = |a: &ConflictRule, b: &ConflictRule| b.overridden.iter().any(|p| p.overlaps(&a.overrider));
    for (i, a) in rules.iter().enumerate() {
        if beats(a, a) {
            tracing::warn!("Conflict rule '{}' can override its own overrider", a.name);
        }
        for b in &rules[i + 1..] {
            if beats(a, b) && beats(b, a) {
                tracing::warn!(
                    "Conflict rules '{}' and '{}' override each other; the higher-ranked instinct wins",
                    a.name,
                    b.name
                );
            }
        }
    }
}
