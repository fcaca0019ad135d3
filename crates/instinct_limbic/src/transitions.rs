//! Allowed-edge table for the emotional state machine.
//!
//! Every state may move to every other state except for a small set of
//! whiplash edges, e.g. a satisfied user does not become frustrated on a
//! single ambiguous message. There is no terminal state.

use instinct_core::EmotionalState;
use serde::Serialize;

use EmotionalState::*;

/// Edges that are rejected outright.
const DISALLOWED: [(EmotionalState, EmotionalState); 10] = [
    (Satisfied, Frustrated),
    (Satisfied, Overwhelmed),
    (Frustrated, Curious),
    (Frustrated, Urgent),
    (Overwhelmed, Curious),
    (Overwhelmed, Urgent),
    (Curious, Frustrated),
    (Curious, Urgent),
    (Urgent, Curious),
    (Urgent, Confused),
];

/// Whether `from -> to` is a legal state change. Self-loops are not edges.
pub fn is_allowed(from: EmotionalState, to: EmotionalState) -> bool {
    from != to && !DISALLOWED.contains(&(from, to))
}

/// States reachable from `from` in one step.
pub fn successors(from: EmotionalState) -> Vec<EmotionalState> {
    EmotionalState::ALL
        .into_iter()
        .filter(|to| is_allowed(from, *to))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// The message did not classify.
    NoMatch,
    /// The candidate equals the current state.
    Unchanged,
    /// The edge is not in the table.
    Disallowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Moved { from: EmotionalState, to: EmotionalState },
    Held { state: EmotionalState, reason: HoldReason },
}

impl TransitionOutcome {
    /// State after the decision.
    pub fn state(&self) -> EmotionalState {
        match self {
            TransitionOutcome::Moved { to, .. } => *to,
            TransitionOutcome::Held { state, .. } => *state,
        }
    }

    pub fn moved(&self) -> bool {
        matches!(self, TransitionOutcome::Moved { .. })
    }
}

/// Decide the next state without touching storage.
pub fn decide(current: EmotionalState, candidate: Option<EmotionalState>) -> TransitionOutcome {
    let Some(to) = candidate else {
        return TransitionOutcome::Held { state: current, reason: HoldReason::NoMatch };
    };
    if to == current {
        return TransitionOutcome::Held { state: current, reason: HoldReason::Unchanged };
    }
    if is_allowed(current, to) {
        TransitionOutcome::Moved { from: current, to }
    } else {
        tracing::debug!("Emotional transition {} -> {} rejected", current, to);
        TransitionOutcome::Held { state: current, reason: HoldReason::Disallowed }
    }
}
