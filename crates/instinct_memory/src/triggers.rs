//! Trigger matching against the current turn.
//!
//! Three trigger shapes are understood:
//! - `re:<pattern>`: case-insensitive regular expression
//! - standing triggers (first word `user` or `always`, or a leading `*`): match every turn
//! - anything else: at least one shared content word with the turn text

use instinct_core::ValidationError;
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap};
use std::sync::{LazyLock, Mutex, PoisonError};

/// Compiled `re:` triggers keyed by pattern text. `None` marks a pattern that failed to compile.
static PATTERN_CACHE: LazyLock<Mutex<HashMap<String, Option<Regex>>>> = LazyLock::new(Default::default);
const PATTERN_CACHE_LIMIT: usize = 512;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "from",
    "have", "has", "had", "was", "were", "will", "would", "should", "could", "can", "about",
    "into", "than", "then", "them", "they", "their", "there", "what", "when", "where", "which",
    "who", "why", "how", "all", "any", "some", "more", "most", "very", "just", "also", "only",
    "like", "want", "need", "please", "does", "did", "its", "our", "out", "too", "get", "make",
];

/// Lowercased words of at least three characters that carry meaning.
pub fn content_words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

pub fn is_standing(trigger: &str) -> bool {
    let lower = trigger.trim_start().to_lowercase();
    if lower.starts_with('*') {
        return true;
    }
    let first = lower.split(|c: char| !c.is_alphanumeric()).next().unwrap_or_default();
    first == "user" || first == "always"
}

fn build_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern.trim()).case_insensitive(true).build()
}

/// Reject `re:` triggers whose pattern does not compile. Other triggers always pass.
pub fn validate_trigger(trigger: &str) -> Result<(), ValidationError> {
    match trigger.trim().strip_prefix("re:") {
        Some(pattern) => build_pattern(pattern).map(|_| ()).map_err(|e| ValidationError::InvalidTriggerPattern {
            pattern: pattern.trim().to_string(),
            reason: e.to_string(),
        }),
        None => Ok(()),
    }
}

fn pattern_matches(pattern: &str, text: &str) -> bool {
    let mut cache = PATTERN_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    if !cache.contains_key(pattern) {
        if cache.len() >= PATTERN_CACHE_LIMIT {
            cache.clear();
        }
        let compiled = match build_pattern(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Invalid trigger regex '{}': {}", pattern, e);
                None
            }
        };
        cache.insert(pattern.to_string(), compiled);
    }
    cache.get(pattern).and_then(Option::as_ref).is_some_and(|re| re.is_match(text))
}

pub fn trigger_matches(trigger: &str, text: &str) -> bool {
    let trigger = trigger.trim();
    if let Some(pattern) = trigger.strip_prefix("re:") {
        return pattern_matches(pattern, text);
    }
    if is_standing(trigger) {
        return true;
    }
    let wanted = content_words(trigger);
    if wanted.is_empty() {
        return false;
    }
    let present = content_words(text);
    wanted.iter().any(|w| present.contains(w))
}

/// Jaccard overlap of content words, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f32 {
    let wa = content_words(a);
    let wb = content_words(b);
    if wa.is_empty() && wb.is_empty() {
        return if a.trim().eq_ignore_ascii_case(b.trim()) { 1.0 } else { 0.0 };
    }
    let shared = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    shared as f32 / union as f32
}
