use crate::sqlite::SqliteInstinctLog;
use crate::store::{ContextLocks, InstinctStore, ListFilter, TimeSource};
use chrono::{DateTime, Duration, TimeZone, Utc};
use instinct_core::{Domain, EngineConfig, InstinctStatus, NewInstinct, Source};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A clock the test can move forward.
fn manual_clock(start: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, TimeSource) {
    let now = Arc::new(Mutex::new(start));
    let handle = now.clone();
    (now, Arc::new(move || *handle.lock().unwrap()))
}

async fn store() -> (InstinctStore, Arc<Mutex<DateTime<Utc>>>) {
    let log = Arc::new(SqliteInstinctLog::new(":memory:").await.expect("Failed to open log"));
    let (now, clock) = manual_clock(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
    (InstinctStore::new(log, &EngineConfig::default()).with_time_source(clock), now)
}

fn spec(domain: Domain, trigger: &str, action: &str, confidence: f32) -> NewInstinct {
    NewInstinct::new(domain, trigger, action, Source::ExplicitUser, confidence)
}

#[tokio::test]
async fn test_create_and_get() {
    let (store, _) = store().await;
    let created = store
        .create("ctx", spec(Domain::Format, "  user asks for data ", " use tables ", 0.8))
        .await
        .expect("Create failed");
    assert_eq!(created.trigger, "user asks for data");
    assert_eq!(created.action, "use tables");
    assert_eq!(created.occurrence_count, 1);
    assert_eq!(created.success_rate, 0.5);
    assert_eq!(created.status, InstinctStatus::Active);

    let fetched = store.get("ctx", created.id).await.unwrap();
    assert_eq!(fetched, created);

    let missing = store.get("ctx", Uuid::new_v4()).await.unwrap_err();
    assert!(missing.is_permanent());
    assert!(!missing.is_validation());
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let (store, _) = store().await;
    let err = store.create("ctx", spec(Domain::Format, "t", "a", 1.5)).await.unwrap_err();
    assert!(err.is_validation());
    let err = store.create("ctx", spec(Domain::Format, "  ", "a", 0.5)).await.unwrap_err();
    assert!(err.is_validation());
    let err = store.create("ctx", spec(Domain::Format, "re:(unclosed", "a", 0.5)).await.unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("invalid trigger pattern"));
    assert!(store.log().events("ctx").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reinforce_bumps_and_resets() {
    let (store, now) = store().await;
    let created = store.create("ctx", spec(Domain::Communication, "user", "be brief", 0.6)).await.unwrap();

    *now.lock().unwrap() += Duration::days(10);
    let r = store.reinforce("ctx", created.id).await.unwrap();
    assert_eq!(r.occurrence_count, 2);
    assert!((r.base_confidence - 0.65).abs() < 1e-6);
    assert_eq!(r.last_triggered_at, *now.lock().unwrap());
    assert_eq!(r.days_since_trigger(store.now()), 0.0);
}

#[tokio::test]
async fn test_reinforce_saturates_at_one() {
    let (store, _) = store().await;
    let created = store.create("ctx", spec(Domain::Communication, "user", "be brief", 0.99)).await.unwrap();
    let r = store.reinforce("ctx", created.id).await.unwrap();
    assert_eq!(r.base_confidence, 1.0);
}

#[tokio::test]
async fn test_adjust_confidence_clamps() {
    let (store, _) = store().await;
    let created = store.create("ctx", spec(Domain::Workflow, "user", "plan first", 0.5)).await.unwrap();

    let up = store.adjust_confidence("ctx", created.id, 0.9).await.unwrap();
    assert_eq!(up.base_confidence, 1.0);
    let down = store.adjust_confidence("ctx", created.id, -5.0).await.unwrap();
    assert_eq!(down.base_confidence, 0.3);

    let err = store.adjust_confidence("ctx", created.id, f32::NAN).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_enable_disable_idempotent() {
    let (store, _) = store().await;
    let created = store.create("ctx", spec(Domain::Workflow, "user", "plan first", 0.5)).await.unwrap();

    assert!(store.disable("ctx", created.id, "user asked").await.unwrap());
    assert!(!store.disable("ctx", created.id, "again").await.unwrap());
    assert!(store.list("ctx", &ListFilter::active()).await.unwrap().is_empty());
    assert_eq!(store.list("ctx", &ListFilter::all()).await.unwrap().len(), 1);

    assert!(store.enable("ctx", created.id).await.unwrap());
    assert!(!store.enable("ctx", created.id).await.unwrap());
    // created + disabled + enabled
    assert_eq!(store.log().events("ctx").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_list_applies_decay_and_filters() {
    let (store, now) = store().await;
    store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    store.create("ctx", spec(Domain::Communication, "user", "be brief", 0.6)).await.unwrap();

    *now.lock().unwrap() += Duration::days(30);
    let listed = store.list("ctx", &ListFilter::active()).await.unwrap();
    assert_eq!(listed[0].instinct.action, "use tables");
    assert!((listed[0].confidence - 0.4).abs() < 1e-4);
    assert!((listed[1].confidence - 0.3).abs() < 1e-4);

    let raw = store.list("ctx", &ListFilter::active().raw()).await.unwrap();
    assert_eq!(raw[0].confidence, 0.8);

    let format_only = store.list("ctx", &ListFilter::active().in_domain(Domain::Format)).await.unwrap();
    assert_eq!(format_only.len(), 1);

    let strong = store.list("ctx", &ListFilter::active().min_confidence(0.35)).await.unwrap();
    assert_eq!(strong.len(), 1);
}

#[tokio::test]
async fn test_record_outcome_ema() {
    let (store, _) = store().await;
    let created = store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();

    let good = store.record_outcome("ctx", created.id, true).await.unwrap();
    assert!((good.success_rate - 0.6).abs() < 1e-6);
    let bad = store.record_outcome("ctx", created.id, false).await.unwrap();
    assert!((bad.success_rate - 0.48).abs() < 1e-6);

    let updated = store.record_outcomes("ctx", &[created.id, Uuid::new_v4()], true).await.unwrap();
    assert_eq!(updated, 1);
}

#[tokio::test]
async fn test_stale_cleanup() {
    let (store, now) = store().await;
    let old = store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    let busy = store.create("ctx", spec(Domain::Workflow, "user", "plan first", 0.8)).await.unwrap();
    for _ in 0..4 {
        store.reinforce("ctx", busy.id).await.unwrap();
    }

    *now.lock().unwrap() += Duration::days(91);
    let stale = store.get_stale("ctx", 90.0).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, old.id);

    assert_eq!(store.cleanup_stale("ctx", 90.0).await.unwrap(), 1);
    assert_eq!(store.cleanup_stale("ctx", 90.0).await.unwrap(), 0);
    assert_eq!(store.get("ctx", old.id).await.unwrap().status, InstinctStatus::Disabled);
    assert_eq!(store.get("ctx", busy.id).await.unwrap().status, InstinctStatus::Active);
}

#[tokio::test]
async fn test_summary() {
    let (store, _) = store().await;
    let a = store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    store.create("ctx", spec(Domain::Format, "user", "use csv", 0.6)).await.unwrap();
    store.create("ctx", spec(Domain::Timing, "user", "reply fast", 0.4)).await.unwrap();
    store.disable("ctx", a.id, "nope").await.unwrap();

    let summary = store.summary("ctx").await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.active, 2);
    assert_eq!(summary.disabled, 1);
    assert_eq!(summary.by_domain.get(&Domain::Format), Some(&2));
    assert!((summary.average_confidence - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn test_applicable_matches_trigger() {
    let (store, _) = store().await;
    store.create("ctx", spec(Domain::Workflow, "deploying services", "run smoke tests", 0.7)).await.unwrap();
    store.create("ctx", spec(Domain::Format, "re:\\bsql\\b", "format queries", 0.6)).await.unwrap();

    let hits = store.applicable("ctx", "Write SQL for the report", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].instinct.action, "format queries");
    assert!(store.applicable("ctx", "hello there", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tail_replay_after_snapshot() {
    let (store, _) = store().await;
    let a = store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();

    // Events appended behind the store's back are picked up on the next read.
    let b_id = Uuid::new_v4();
    let mut b = a.clone();
    b.id = b_id;
    b.action = "use csv".into();
    store
        .log()
        .append("ctx", &[crate::events::InstinctEvent::Created { instinct: b }], store.now())
        .await
        .unwrap();

    let snapshot = store.snapshot("ctx").await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.get(&b_id).is_some());
}

#[tokio::test]
async fn test_corrupt_snapshot_falls_back_to_replay() {
    let (store, _) = store().await;
    let a = store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    store.reinforce("ctx", a.id).await.unwrap();
    let live = store.snapshot("ctx").await.unwrap();

    sqlx::query("UPDATE instinct_snapshots SET snapshot_json = '{not json' WHERE context_id = ?")
        .bind("ctx")
        .execute(store.log().pool())
        .await
        .unwrap();
    assert!(store.log().load_snapshot("ctx").await.is_err());

    let recovered = store.snapshot("ctx").await.unwrap();
    assert_eq!(recovered, live);
    // and the snapshot was re-saved
    assert_eq!(store.log().load_snapshot("ctx").await.unwrap(), Some(live));
}

#[tokio::test]
async fn test_rebuild_matches_live() {
    let (store, now) = store().await;
    let a = store.create("ctx", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    let b = store.create("ctx", spec(Domain::Communication, "user", "be brief", 0.6)).await.unwrap();
    *now.lock().unwrap() += Duration::hours(5);
    store.reinforce("ctx", a.id).await.unwrap();
    store.adjust_confidence("ctx", b.id, -0.1).await.unwrap();
    store.record_outcome("ctx", a.id, false).await.unwrap();
    store.disable("ctx", b.id, "test").await.unwrap();

    let live = store.snapshot("ctx").await.unwrap();
    let rebuilt = store.rebuild_snapshot("ctx").await.unwrap();
    assert_eq!(live, rebuilt);
}

#[tokio::test]
async fn test_contexts_are_isolated() {
    let (store, _) = store().await;
    let a = store.create("alice", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    store.create("bob", spec(Domain::Format, "user", "use prose", 0.8)).await.unwrap();

    assert!(store.get("bob", a.id).await.is_err());
    assert!(store.disable("bob", a.id, "x").await.is_err());
    assert_eq!(store.list("alice", &ListFilter::all()).await.unwrap().len(), 1);

    let mut contexts = store.log().contexts().await.unwrap();
    contexts.sort();
    assert_eq!(contexts, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn test_import_is_all_or_nothing() {
    let (store, _) = store().await;
    let json = r#"[
        {"domain": "format", "trigger": "user", "action": "use tables", "source": "explicit-user", "confidence": 0.8},
        {"domain": "astrology", "trigger": "user", "action": "read stars", "source": "explicit-user", "confidence": 0.8}
    ]"#;
    let err = store.import("ctx", json).await.unwrap_err();
    assert!(err.is_validation());
    assert!(store.list("ctx", &ListFilter::all()).await.unwrap().is_empty());

    let err = store.import("ctx", "not json").await.unwrap_err();
    assert!(err.is_validation());

    let bad_pattern = r#"[
        {"domain": "format", "trigger": "user", "action": "use tables", "source": "explicit-user", "confidence": 0.8},
        {"domain": "format", "trigger": "re:[", "action": "use csv", "source": "explicit-user", "confidence": 0.8}
    ]"#;
    let err = store.import("ctx", bad_pattern).await.unwrap_err();
    assert!(err.is_validation());
    assert!(store.list("ctx", &ListFilter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_import_round_trip_uses_fresh_ids() {
    let (store, _) = store().await;
    let a = store.create("src", spec(Domain::Format, "user", "use tables", 0.8)).await.unwrap();
    store.record_outcome("src", a.id, true).await.unwrap();

    let exported = store.export("src").await.unwrap();
    assert_eq!(store.import("dst", &exported).await.unwrap(), 1);

    let imported = store.list("dst", &ListFilter::all()).await.unwrap();
    assert_eq!(imported.len(), 1);
    let i = &imported[0].instinct;
    assert_ne!(i.id, a.id);
    assert_eq!(i.source, Source::Imported);
    assert_eq!(i.action, "use tables");
    assert!((i.success_rate - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn test_apply_profile() {
    let (store, _) = store().await;
    let mine = store.create("ctx", spec(Domain::Format, "user", "use prose", 0.8)).await.unwrap();

    assert_eq!(store.apply_profile("ctx", "Analyst", false).await.unwrap(), 4);
    assert_eq!(store.list("ctx", &ListFilter::active()).await.unwrap().len(), 5);

    assert_eq!(store.apply_profile("ctx", "executive", true).await.unwrap(), 4);
    let active = store.list("ctx", &ListFilter::active()).await.unwrap();
    assert_eq!(active.len(), 4);
    assert!(active.iter().all(|s| s.instinct.source == Source::ProfilePreset));
    assert_eq!(store.get("ctx", mine.id).await.unwrap().status, InstinctStatus::Disabled);

    let err = store.apply_profile("ctx", "wizard", false).await.unwrap_err();
    assert!(matches!(err, instinct_core::InstinctError::UnknownProfile(_)));
}

#[tokio::test]
async fn test_idle_context_locks_are_swept() {
    let locks = ContextLocks::with_sweep_threshold(4);
    let held = locks.acquire("held").await;
    for i in 0..20 {
        let _guard = locks.acquire(&format!("ctx-{}", i)).await;
    }
    assert!(locks.len() <= 4, "lock map grew to {}", locks.len());

    // the held lock survived every sweep and still excludes
    let blocked = tokio::time::timeout(std::time::Duration::from_millis(20), locks.acquire("held")).await;
    assert!(blocked.is_err());
    drop(held);
    let _again = locks.acquire("held").await;
}
