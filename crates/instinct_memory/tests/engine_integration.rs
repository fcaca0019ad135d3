//! Integration tests for BehaviorEngine
//!
//! Uses tempfile::TempDir for isolated SQLite databases and a hand-driven
//! clock so decay and staleness are deterministic.

use chrono::{DateTime, Duration, TimeZone, Utc};
use instinct_core::{
    ActionPattern, ConflictRule, Domain, EmotionalState, EngineConfig, InstinctStatus, NewInstinct, Source,
};
use instinct_limbic::TransitionOutcome;
use instinct_memory::{
    Applied, BehaviorEngine, DetectionKind, ListFilter, SqliteInstinctLog, TimeSource, TurnBoundary, TurnContext,
};
use rand::rngs::mock::StepRng;
use std::sync::{Arc, Mutex};

struct Harness {
    engine: BehaviorEngine,
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Harness {
    fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

async fn setup(dir: &tempfile::TempDir, config: EngineConfig, now: Arc<Mutex<DateTime<Utc>>>) -> Harness {
    let db_path = dir.path().join("instincts.db");
    let log = Arc::new(SqliteInstinctLog::new(&db_path).await.unwrap());
    let handle = now.clone();
    let clock: TimeSource = Arc::new(move || *handle.lock().unwrap());
    Harness { engine: BehaviorEngine::with_clock(log, &config, clock), now }
}

async fn harness(dir: &tempfile::TempDir) -> Harness {
    setup(dir, EngineConfig::default(), Arc::new(Mutex::new(start()))).await
}

fn explicit(domain: Domain, trigger: &str, action: &str, confidence: f32) -> NewInstinct {
    NewInstinct::new(domain, trigger, action, Source::ExplicitUser, confidence)
}

/// Scenario: decay halves confidence per half-life and stops at the floor.
#[tokio::test]
async fn test_decay_scenario() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;
    let store = h.engine.store();
    store.create("ctx", explicit(Domain::Format, "user", "use tables", 0.8)).await.unwrap();

    h.advance(Duration::days(30));
    let listed = store.list("ctx", &ListFilter::active()).await.unwrap();
    assert!((listed[0].confidence - 0.4).abs() < 1e-4);

    h.advance(Duration::days(30));
    let listed = store.list("ctx", &ListFilter::active()).await.unwrap();
    assert!((listed[0].confidence - 0.3).abs() < 1e-6);
    // stored base is untouched
    assert_eq!(listed[0].instinct.base_confidence, 0.8);
}

/// Scenario: "be brief" 0.7 beats "explain thoroughly" 0.6 under a 0.5 rule.
#[tokio::test]
async fn test_conflict_scenario() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.conflict_rules.push(ConflictRule::new(
        "brief_over_thorough",
        ActionPattern::in_domain(Domain::Communication, "brief"),
        vec![ActionPattern::in_domain(Domain::Communication, "thorough")],
        0.5,
    ));
    let h = setup(&dir, config, Arc::new(Mutex::new(start()))).await;
    let store = h.engine.store();
    store.create("ctx", explicit(Domain::Communication, "user", "be brief", 0.7)).await.unwrap();
    store.create("ctx", explicit(Domain::Communication, "user", "explain thoroughly", 0.6)).await.unwrap();

    let mut rng = StepRng::new(0, 0);
    let digest = h.engine.guidance("ctx", &TurnContext::new("summarize this"), &mut rng).await.unwrap();
    let actions: Vec<&str> = digest.entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(actions, vec!["be brief"]);
}

/// Scenario: engaged user gets frustrated; guidance turns supportive.
#[tokio::test]
async fn test_emotional_scenario() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;

    let first = h.engine.on_turn(TurnBoundary::user("ctx", "sounds good, keep going")).await.unwrap();
    assert_eq!(first.transition.state(), EmotionalState::Engaged);

    let second = h.engine.on_turn(TurnBoundary::user("ctx", "nevermind, forget it")).await.unwrap();
    assert_eq!(
        second.transition,
        TransitionOutcome::Moved { from: EmotionalState::Engaged, to: EmotionalState::Frustrated }
    );
    assert!(second.detections.iter().any(|d| d.kind == DetectionKind::Frustration));

    let mut rng = StepRng::new(0, 0);
    let digest = h.engine.guidance("ctx", &TurnContext::new("next"), &mut rng).await.unwrap();
    let line = digest.emotional_line.unwrap();
    assert!(line.starts_with("User seems frustrated"));
    assert!(line.contains("supportive"));
}

#[tokio::test]
async fn test_observer_creates_then_reinforces() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;

    let first = h.engine.on_turn(TurnBoundary::user("ctx", "please be brief")).await.unwrap();
    assert_eq!(first.detections.len(), 1);
    assert_eq!(first.detections[0].applied, Applied::Created);
    let id = first.detections[0].instinct_id;

    h.advance(Duration::days(2));
    let second = h.engine.on_turn(TurnBoundary::user("ctx", "Be brief next time too")).await.unwrap();
    assert_eq!(second.detections[0].applied, Applied::Reinforced);
    assert_eq!(second.detections[0].instinct_id, id);

    let instinct = h.engine.store().get("ctx", id).await.unwrap();
    assert_eq!(instinct.occurrence_count, 2);
    assert_eq!(instinct.source, Source::PreferenceExpressed);
    assert_eq!(instinct.last_triggered_at, *h.now.lock().unwrap());
}

#[tokio::test]
async fn test_disabled_instinct_is_not_reinforced() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;

    let first = h.engine.on_turn(TurnBoundary::user("ctx", "please be brief")).await.unwrap();
    let id = first.detections[0].instinct_id;
    h.engine.store().disable("ctx", id, "user turned it off").await.unwrap();

    let again = h.engine.on_turn(TurnBoundary::user("ctx", "please be brief")).await.unwrap();
    assert_eq!(again.detections[0].applied, Applied::SkippedDisabled);

    let instinct = h.engine.store().get("ctx", id).await.unwrap();
    assert_eq!(instinct.status, InstinctStatus::Disabled);
    assert_eq!(instinct.occurrence_count, 1);
    assert_eq!(h.engine.store().list("ctx", &ListFilter::all()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_frustration_penalizes_surfaced() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;
    let store = h.engine.store();
    let shown = store.create("ctx", explicit(Domain::Format, "user", "use tables", 0.95)).await.unwrap();

    let mut rng = StepRng::new(0, 0);
    h.engine.guidance("ctx", &TurnContext::new("report"), &mut rng).await.unwrap();

    let obs = h.engine.on_turn(TurnBoundary::user("ctx", "ugh, this is useless")).await.unwrap();
    let outcome = obs.outcome.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.updated, 1);
    assert!((store.get("ctx", shown.id).await.unwrap().success_rate - 0.4).abs() < 1e-6);

    // graded once only
    let obs = h.engine.on_turn(TurnBoundary::user("ctx", "still broken")).await.unwrap();
    assert_eq!(obs.outcome.unwrap().updated, 0);
}

#[tokio::test]
async fn test_runtime_history_drives_repetition() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;
    let msg = "list the open invoices";
    let turn = TurnBoundary {
        context_id: "ctx".into(),
        user_text: msg.into(),
        agent_text: Some("Here are the invoices.".into()),
        turn_context: TurnContext::new(msg).with_history(vec![msg.to_string(), msg.to_string()]),
    };
    let obs = h.engine.on_turn(turn).await.unwrap();
    let rep = obs.detections.iter().find(|d| d.kind == DetectionKind::Repetition).unwrap();
    let instinct = h.engine.store().get("ctx", rep.instinct_id).await.unwrap();
    assert_eq!(instinct.domain, Domain::Workflow);
    assert_eq!(instinct.source, Source::RepetitionConfirmed);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let now = Arc::new(Mutex::new(start()));
    let id = {
        let h = setup(&dir, EngineConfig::default(), now.clone()).await;
        h.engine.on_turn(TurnBoundary::user("ctx", "I need this asap")).await.unwrap();
        let created = h.engine.store().create("ctx", explicit(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
        h.engine.store().reinforce("ctx", created.id).await.unwrap();
        created.id
    };

    let h = setup(&dir, EngineConfig::default(), now).await;
    let instinct = h.engine.store().get("ctx", id).await.unwrap();
    assert_eq!(instinct.occurrence_count, 2);
    assert_eq!(h.engine.tracker().current("ctx").await.unwrap(), EmotionalState::Urgent);

    let live = h.engine.store().snapshot("ctx").await.unwrap();
    let rebuilt = h.engine.store().rebuild_snapshot("ctx").await.unwrap();
    assert_eq!(live, rebuilt);
}

#[tokio::test]
async fn test_contexts_do_not_leak() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;
    h.engine.on_turn(TurnBoundary::user("alice", "give me the answer as json")).await.unwrap();
    h.engine.on_turn(TurnBoundary::user("alice", "this is confusing??")).await.unwrap();

    let mut rng = StepRng::new(0, 0);
    let bob = h.engine.guidance("bob", &TurnContext::new("anything"), &mut rng).await.unwrap();
    assert!(bob.is_empty());
    assert_eq!(h.engine.tracker().current("bob").await.unwrap(), EmotionalState::Neutral);
    assert!(!h.engine.store().list("alice", &ListFilter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_is_idempotent_across_contexts() {
    let dir = tempfile::TempDir::new().unwrap();
    let h = harness(&dir).await;
    h.engine.store().create("a", explicit(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    h.engine.store().create("b", explicit(Domain::Timing, "user", "reply fast", 0.8)).await.unwrap();

    h.advance(Duration::days(100));
    assert_eq!(h.engine.cleanup_stale().await.unwrap(), 2);
    assert_eq!(h.engine.cleanup_stale().await.unwrap(), 0);
}

#[tokio::test]
async fn test_digest_respects_bounds() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.injection.max_inject = 3;
    config.injection.char_budget = 120;
    let h = setup(&dir, config, Arc::new(Mutex::new(start()))).await;
    for i in 0..10 {
        let action = format!("workflow habit number {} {}", i, "-".repeat(i * 4));
        h.engine.store().create("ctx", explicit(Domain::Workflow, "user", &action, 0.95)).await.unwrap();
    }
    h.engine.tracker().transition("ctx", Some(EmotionalState::Curious)).await.unwrap();

    let mut rng = StepRng::new(0, 0);
    let digest = h.engine.guidance("ctx", &TurnContext::new("go"), &mut rng).await.unwrap();
    assert!(digest.entries.len() <= 3);
    assert!(digest.char_count() <= 120);
    assert!(digest.emotional_line.is_some());
    assert_eq!(digest.applied.len(), digest.entries.len());
}
