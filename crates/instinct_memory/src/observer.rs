//! Observation Pipeline
//!
//! Watches user messages and turns recognizable signals into instincts:
//! - explicit statements ("always …", "from now on …", "I prefer …")
//! - verbosity and format preferences
//! - corrections and repeated requests
//! - urgency, expertise and learning style
//! - frustration and confusion
//!
//! A detection either reinforces a matching instinct or creates a new one.
//! Satisfaction and frustration also feed back into the success rate of
//! whatever was surfaced on the previous turn.

use crate::emotion::EmotionalStateTracker;
use crate::store::InstinctStore;
use crate::triggers::similarity;
use chrono::{DateTime, Utc};
use instinct_core::config::ObservationConfig;
use instinct_core::{Domain, EmotionalState, NewInstinct, Result, Source};
use instinct_limbic::TransitionOutcome;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use uuid::Uuid;

static RE_EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[.!?;]\s*)(?:please\s+)?(always|never|from now on,?|going forward,?|i prefer|i'd prefer|i would prefer)\s+(?P<rest>[^.!?\n]{3,})",
    )
    .unwrap()
});
static RE_CONCISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(be brief|concise|shorter|to the point|tl;?dr)").unwrap());
static RE_DETAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(more detail|explain more|elaborate|expand on)\b").unwrap());
static RE_SIMPLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(keep it simple|don't over-explain|plain english)\b").unwrap());
static RE_FORMAT_NAMED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:as|in|use|using|prefer)\s+(?:a\s+)?(json|csv|markdown|table)\b").unwrap());
static RE_BULLETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(bullet points|bulleted|list format)\b").unwrap());
static RE_PROSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(in paragraphs|as prose|full sentences|narrative form)\b").unwrap());
static RE_CORRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(no, i meant|^\s*actually\b|wait, that's not|let me clarify|i want you to instead|not quite)")
        .unwrap()
});
static RE_REPEAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(again|once more|like you did before|same as last time|remember when you)\b").unwrap()
});
static RE_URGENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(urgent|asap|right now|immediately|hurry|deadline)\b").unwrap());
static RE_EXPERTISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:i'm an?|i am an?|as an?)\s+(?:experienced\s+|senior\s+)?(developer|engineer|programmer|data scientist|analyst|designer|lawyer|doctor|accountant|researcher)\b",
    )
    .unwrap()
});
static RE_EXAMPLES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(show me an example|with examples|give me an example)\b").unwrap());
static RE_STEPWISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(step by step|step-by-step|walk me through)\b").unwrap());
static RE_VISUAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(diagram|visuali[sz]e|draw it)\b").unwrap());
static RE_BEGINNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i'm new to|i am new to|i'm a beginner|never used)\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Explicit,
    Verbosity,
    Format,
    Correction,
    Repetition,
    Urgency,
    Expertise,
    LearningStyle,
    Frustration,
    Confusion,
}

/// A proposed instinct extracted from one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: DetectionKind,
    pub spec: NewInstinct,
}

impl Detection {
    fn new(kind: DetectionKind, domain: Domain, trigger: String, action: String, source: Source, confidence: f32) -> Self {
        Self {
            kind,
            spec: NewInstinct::new(domain, trigger, action, source, confidence),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    Created,
    Reinforced,
    /// A matching instinct exists but the user disabled it.
    SkippedDisabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedDetection {
    pub kind: DetectionKind,
    pub instinct_id: Uuid,
    pub applied: Applied,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeSignal {
    pub success: bool,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub detections: Vec<AppliedDetection>,
    pub transition: TransitionOutcome,
    pub outcome: Option<OutcomeSignal>,
}

// ============================================================================
// Pure detection
// ============================================================================

fn guess_domain(text: &str) -> Domain {
    let t = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| t.contains(w));
    if has(&["table", "json", "csv", "markdown", "bullet", "format", "heading"]) {
        Domain::Format
    } else if has(&["test", "verify", "double-check", "check ", "cite", "source"]) {
        Domain::Verification
    } else if has(&["tool", "search", "browser", "calculator", "query"]) {
        Domain::ToolSelection
    } else if has(&["morning", "evening", "deadline", "before ", "after ", "schedule"]) {
        Domain::Timing
    } else if has(&["step", "workflow", "first ", "then "]) {
        Domain::Workflow
    } else {
        Domain::Communication
    }
}

fn explicit(message: &str) -> Option<Detection> {
    let caps = RE_EXPLICIT.captures(message)?;
    let lead = caps.get(1)?.as_str().to_lowercase();
    let rest = caps.name("rest")?.as_str().trim().trim_end_matches(',');
    let action = if lead == "never" {
        format!("never {}", rest)
    } else {
        rest.to_string()
    };
    let key: String = action.to_lowercase().chars().take(60).collect();
    Some(Detection::new(
        DetectionKind::Explicit,
        guess_domain(&action),
        format!("user explicitly asked: {}", key.trim()),
        action,
        Source::ExplicitUser,
        0.9,
    ))
}

fn verbosity(message: &str) -> Option<Detection> {
    let (pref, action) = if RE_CONCISE.is_match(message) {
        ("concise", "be brief and concise, skip detailed explanations")
    } else if RE_DETAILED.is_match(message) {
        ("detailed", "provide thorough explanations with examples")
    } else if RE_SIMPLE.is_match(message) {
        ("simple", "use simple language and avoid jargon")
    } else {
        return None;
    };
    Some(Detection::new(
        DetectionKind::Verbosity,
        Domain::Communication,
        format!("user prefers {} responses", pref),
        action.to_string(),
        Source::PreferenceExpressed,
        0.7,
    ))
}

fn format_preference(message: &str) -> Option<Detection> {
    let (name, action) = if let Some(c) = RE_FORMAT_NAMED.captures(message) {
        let name = c.get(1)?.as_str().to_lowercase();
        let action = format!("use {} format by default", name);
        (name, action)
    } else if RE_BULLETS.is_match(message) {
        ("bullets".to_string(), "use bullet points for lists and structured content".to_string())
    } else if RE_PROSE.is_match(message) {
        ("prose".to_string(), "use paragraph/prose format with full sentences".to_string())
    } else {
        return None;
    };
    Some(Detection::new(
        DetectionKind::Format,
        Domain::Format,
        format!("user prefers {} format", name),
        action,
        Source::PreferenceExpressed,
        0.8,
    ))
}

fn repetition(message: &str, history: &[String], config: &ObservationConfig) -> Option<Detection> {
    let similar = history
        .iter()
        .rev()
        .take(config.history_window)
        .filter(|h| similarity(h, message) >= config.similarity_threshold)
        .count();
    let repeated = similar + 1 >= config.repetition_threshold.max(2);
    if !(RE_REPEAT.is_match(message) || repeated) {
        return None;
    }
    Some(Detection::new(
        DetectionKind::Repetition,
        Domain::Workflow,
        "user requests repetition".to_string(),
        "follow the same pattern as before".to_string(),
        Source::RepetitionConfirmed,
        0.6,
    ))
}

fn learning_style(message: &str) -> Option<Detection> {
    let (trigger, action) = if RE_STEPWISE.is_match(message) {
        ("user prefers step-by-step guidance", "explain step by step")
    } else if RE_EXAMPLES.is_match(message) {
        ("user learns from examples", "explain with a concrete example first")
    } else if RE_VISUAL.is_match(message) {
        ("user prefers visuals", "use diagrams or tables to illustrate")
    } else if RE_BEGINNER.is_match(message) {
        ("user is new to the topic", "explain fundamentals before details")
    } else {
        return None;
    };
    Some(Detection::new(
        DetectionKind::LearningStyle,
        Domain::LearningStyle,
        trigger.to_string(),
        action.to_string(),
        Source::LearningStyleDetected,
        0.65,
    ))
}

/// Every signal in `message`, at most one per kind.
pub fn detect_signals(message: &str, history: &[String], config: &ObservationConfig) -> Vec<Detection> {
    let mut out = Vec::new();
    out.extend(explicit(message));
    out.extend(verbosity(message));
    out.extend(format_preference(message));
    if RE_CORRECTION.is_match(message) {
        out.push(Detection::new(
            DetectionKind::Correction,
            Domain::Communication,
            "user corrects previous response".to_string(),
            "acknowledge the correction and adjust approach immediately".to_string(),
            Source::CorrectionDetected,
            0.7,
        ));
    }
    out.extend(repetition(message, history, config));
    if RE_URGENT.is_match(message) {
        out.push(Detection::new(
            DetectionKind::Urgency,
            Domain::Timing,
            "user is under time pressure".to_string(),
            "urgent: lead with the answer and skip background".to_string(),
            Source::UrgencyDetected,
            0.7,
        ));
    }
    if let Some(role) = RE_EXPERTISE.captures(message).and_then(|c| c.get(1)) {
        let role = role.as_str().to_lowercase();
        out.push(Detection::new(
            DetectionKind::Expertise,
            Domain::Expertise,
            format!("user is {} {}", indefinite_article(&role), role),
            format!("assume {}-level knowledge; skip basics", role),
            Source::ExpertiseDetected,
            0.75,
        ));
    }
    out.extend(learning_style(message));
    match instinct_limbic::classify(message) {
        Some(EmotionalState::Frustrated) => out.push(Detection::new(
            DetectionKind::Frustration,
            Domain::EmotionalState,
            "user shows frustration".to_string(),
            "user is frustrated: be patient, acknowledge the issue and offer alternatives".to_string(),
            Source::FrustrationDetected,
            0.6,
        )),
        Some(EmotionalState::Confused) => out.push(Detection::new(
            DetectionKind::Confusion,
            Domain::EmotionalState,
            "user shows confusion".to_string(),
            "user is confused: clarify with simpler wording and an example".to_string(),
            Source::ConfusionDetected,
            0.6,
        )),
        _ => {}
    }
    out
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct ObservationPipeline {
    store: Arc<InstinctStore>,
    tracker: Arc<EmotionalStateTracker>,
    config: ObservationConfig,
    /// Instincts shown on the most recent digest, per context.
    surfaced: Mutex<HashMap<String, SurfacedSet>>,
}

struct SurfacedSet {
    ids: Vec<Uuid>,
    at: DateTime<Utc>,
}

impl ObservationPipeline {
    pub fn new(store: Arc<InstinctStore>, tracker: Arc<EmotionalStateTracker>, config: ObservationConfig) -> Self {
        Self {
            store,
            tracker,
            config,
            surfaced: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ObservationConfig {
        &self.config
    }

    /// Remember what the last digest showed so the next message can grade it.
    /// Sets from contexts idle longer than `context_idle_hours` are dropped.
    pub fn mark_surfaced(&self, context_id: &str, ids: &[Uuid]) {
        let now = self.store.now();
        let ttl = self.config.context_idle_ttl();
        let mut map = self.surfaced.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, set| now - set.at < ttl);
        if ids.is_empty() {
            map.remove(context_id);
        } else {
            map.insert(context_id.to_string(), SurfacedSet { ids: ids.to_vec(), at: now });
        }
    }

    pub fn surfaced(&self, context_id: &str) -> Vec<Uuid> {
        let map = self.surfaced.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(context_id).map(|set| set.ids.clone()).unwrap_or_default()
    }

    /// Contexts that currently hold an ungraded surfaced set.
    pub fn pending_contexts(&self) -> usize {
        self.surfaced.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Grade the last surfaced set. Each set is graded at most once, and a
    /// set older than the idle window is discarded ungraded.
    pub async fn record_outcome(&self, context_id: &str, success: bool) -> Result<usize> {
        let now = self.store.now();
        let ttl = self.config.context_idle_ttl();
        let ids = {
            let mut map = self.surfaced.lock().unwrap_or_else(PoisonError::into_inner);
            match map.remove(context_id) {
                Some(set) if now - set.at < ttl => set.ids,
                _ => Vec::new(),
            }
        };
        if ids.is_empty() {
            return Ok(0);
        }
        let updated = self.store.record_outcomes(context_id, &ids, success).await?;
        if success {
            tracing::info!("Detected satisfaction - reinforced {} instincts", updated);
        } else {
            tracing::warn!("Detected frustration - penalized {} instincts", updated);
        }
        Ok(updated)
    }

    pub async fn detect(&self, context_id: &str, message: &str, history: &[String]) -> Result<Observation> {
        instinct_core::validate_context_id(context_id)?;

        let outcome = if instinct_limbic::signals_satisfaction(message) {
            Some(true)
        } else if instinct_limbic::signals_frustration(message) {
            Some(false)
        } else {
            None
        };
        let outcome = match outcome {
            Some(success) => Some(OutcomeSignal {
                success,
                updated: self.record_outcome(context_id, success).await?,
            }),
            None => None,
        };

        let mut seen = HashSet::new();
        let mut detections = Vec::new();
        for detection in detect_signals(message, history, &self.config) {
            let key = (detection.spec.domain, detection.spec.trigger.to_lowercase());
            if !seen.insert(key) {
                continue;
            }
            detections.push(self.apply(context_id, detection).await?);
        }

        let transition = self.tracker.observe(context_id, message).await?;
        Ok(Observation { detections, transition, outcome })
    }

    async fn apply(&self, context_id: &str, detection: Detection) -> Result<AppliedDetection> {
        let snapshot = self.store.snapshot(context_id).await?;
        let trigger = detection.spec.trigger.trim().to_lowercase();
        let existing = snapshot
            .instincts
            .values()
            .filter(|i| i.domain == detection.spec.domain && i.trigger.to_lowercase() == trigger)
            .max_by_key(|i| i.is_active());

        let (instinct_id, applied) = match existing {
            Some(i) if !i.is_active() => {
                tracing::debug!("Skipping {:?} signal: instinct {} is disabled", detection.kind, i.id);
                (i.id, Applied::SkippedDisabled)
            }
            Some(i) => {
                let id = i.id;
                self.store.reinforce(context_id, id).await?;
                (id, Applied::Reinforced)
            }
            None => {
                let created = self.store.create(context_id, detection.spec).await?;
                (created.id, Applied::Created)
            }
        };
        Ok(AppliedDetection { kind: detection.kind, instinct_id, applied })
    }
}

fn indefinite_article(word: &str) -> &'static str {
    match word.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(message: &str, history: &[String]) -> Vec<DetectionKind> {
        detect_signals(message, history, &ObservationConfig::default())
            .into_iter()
            .map(|d| d.kind)
            .collect()
    }

    #[test]
    fn test_explicit_statement() {
        let d = detect_signals("From now on, use metric units.", &[], &ObservationConfig::default());
        let explicit = d.iter().find(|d| d.kind == DetectionKind::Explicit).unwrap();
        assert_eq!(explicit.spec.action, "use metric units");
        assert_eq!(explicit.spec.source, Source::ExplicitUser);
        assert!(explicit.spec.trigger.starts_with("user explicitly asked"));

        let never = detect_signals("Please never use emojis", &[], &ObservationConfig::default());
        assert_eq!(never[0].spec.action, "never use emojis");
    }

    #[test]
    fn test_preferences() {
        assert!(kinds("can you be brief?", &[]).contains(&DetectionKind::Verbosity));
        let d = detect_signals("give me the results as a table", &[], &ObservationConfig::default());
        let f = d.iter().find(|d| d.kind == DetectionKind::Format).unwrap();
        assert_eq!(f.spec.trigger, "user prefers table format");
        assert_eq!(f.spec.domain, Domain::Format);
    }

    #[test]
    fn test_correction_and_urgency() {
        assert!(kinds("No, I meant the other file", &[]).contains(&DetectionKind::Correction));
        assert!(kinds("I need this asap", &[]).contains(&DetectionKind::Urgency));
    }

    #[test]
    fn test_repetition_needs_three_occurrences() {
        let msg = "summarize the sales numbers";
        let once = vec![msg.to_string()];
        assert!(!kinds(msg, &once).contains(&DetectionKind::Repetition));
        let twice = vec![msg.to_string(), "Summarize the sales numbers!".to_string()];
        assert!(kinds(msg, &twice).contains(&DetectionKind::Repetition));
        assert!(kinds("do it again", &[]).contains(&DetectionKind::Repetition));
    }

    #[test]
    fn test_expertise_and_learning_style() {
        let d = detect_signals("I'm a senior engineer, walk me through it", &[], &ObservationConfig::default());
        let e = d.iter().find(|d| d.kind == DetectionKind::Expertise).unwrap();
        assert_eq!(e.spec.trigger, "user is an engineer");
        assert!(d.iter().any(|d| d.kind == DetectionKind::LearningStyle));

        let d = detect_signals("as a data scientist I want raw numbers", &[], &ObservationConfig::default());
        let e = d.iter().find(|d| d.kind == DetectionKind::Expertise).unwrap();
        assert_eq!(e.spec.trigger, "user is a data scientist");
        let d = detect_signals("I am an analyst", &[], &ObservationConfig::default());
        let e = d.iter().find(|d| d.kind == DetectionKind::Expertise).unwrap();
        assert_eq!(e.spec.trigger, "user is an analyst");
    }

    #[test]
    fn test_emotional_cues() {
        assert!(kinds("nevermind, forget it", &[]).contains(&DetectionKind::Frustration));
        assert!(kinds("what do you mean by that", &[]).contains(&DetectionKind::Confusion));
        assert!(kinds("compile the report", &[]).is_empty());
    }
}
