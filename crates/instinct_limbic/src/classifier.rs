//! Emotion Classifier
//!
//! Reads a single user message and proposes an emotional state. Pattern sets
//! are checked in a fixed order, most specific first, so "nevermind, thanks"
//! reads as frustration rather than gratitude.

use instinct_core::EmotionalState;
use regex::RegexSet;
use std::sync::LazyLock;

static FRUSTRATED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(nevermind|never mind|forget it|whatever)\b",
        r"(?i)^\s*(ok|okay|fine)[!.]*\s*$",
        r"(?i)\b(not working|still (broken|wrong|failing)|useless|ugh|annoying|frustrat\w*)\b",
        r"(?i)\b(how many times|i already (said|told you))\b",
    ])
    .unwrap()
});

static OVERWHELMED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(too much|too many|overwhelm\w*|information overload|can't keep up)\b",
        r"(?i)\b(slow down|one (thing|step) at a time)\b",
    ])
    .unwrap()
});

static URGENT: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(urgent\w*|asap|right now|immediately|hurry|no time)\b",
        r"(?i)\b(deadline|due (today|tonight|in an hour))\b",
    ])
    .unwrap()
});

static CONFUSED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(confus\w*|unclear|makes no sense|lost me|i'm lost)\b",
        r"(?i)\b(don't understand|do not understand|what do you mean)\b",
        r"\?{2,}\s*$",
    ])
    .unwrap()
});

static SATISFIED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(perfect|great|awesome|thanks|thank you|exactly what|love it)\b",
        r"(?i)\b(amazing|brilliant|excellent|that's what i needed)\b",
        r"👍|✅|🎉|😊",
    ])
    .unwrap()
});

static CURIOUS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(curious|wonder\w*|interesting|tell me more)\b",
        r"(?i)\b(how does|why does|what if|what happens)\b",
    ])
    .unwrap()
});

static ENGAGED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(let's|next step|keep going|continue|sounds good|go ahead)\b",
    ])
    .unwrap()
});

static NEUTRAL: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"(?i)^\s*(hi|hello|hey|good (morning|afternoon|evening))\b"]).unwrap()
});

/// Classification order. Earlier entries win when several sets match.
fn ordered_sets() -> [(EmotionalState, &'static RegexSet); 8] {
    [
        (EmotionalState::Frustrated, &*FRUSTRATED),
        (EmotionalState::Overwhelmed, &*OVERWHELMED),
        (EmotionalState::Urgent, &*URGENT),
        (EmotionalState::Confused, &*CONFUSED),
        (EmotionalState::Satisfied, &*SATISFIED),
        (EmotionalState::Curious, &*CURIOUS),
        (EmotionalState::Engaged, &*ENGAGED),
        (EmotionalState::Neutral, &*NEUTRAL),
    ]
}

fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'").trim().to_string()
}

/// Propose a state for `text`, or `None` when nothing matches.
pub fn classify(text: &str) -> Option<EmotionalState> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }
    ordered_sets()
        .into_iter()
        .find(|(_, set)| set.is_match(&normalized))
        .map(|(state, _)| state)
}

/// Whether the message carries a satisfaction marker, used as a success signal.
///
/// Checked against the marker sets directly: "perfect, now hurry" is still
/// a success even though it classifies as urgent. A dismissal in the same
/// message wins.
pub fn signals_satisfaction(text: &str) -> bool {
    let normalized = normalize(text);
    SATISFIED.is_match(&normalized) && !FRUSTRATED.is_match(&normalized)
}

/// Whether the message carries a frustration marker, used as a failure signal.
pub fn signals_frustration(text: &str) -> bool {
    FRUSTRATED.is_match(&normalize(text))
}
