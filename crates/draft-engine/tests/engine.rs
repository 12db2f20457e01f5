//! End-to-end tests for the persistence engine.
//!
//! Drives a full manager against `InMemoryRemote` under tokio's paused clock,
//! so debounce windows, retry backoff, and the background interval run
//! deterministically without wall-clock waits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use draft_core::conflict::ResolutionStrategy;
use draft_core::document::DraftDocument;
use draft_engine::{
    InMemoryRemote, PersistenceConfig, PersistenceEvent, PersistenceManager, SaveError,
};
use tokio::time::{sleep, Instant};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn draft(marker: &str) -> DraftDocument {
    let mut d = DraftDocument::new("tok-1");
    d.input_text = Some(marker.to_string());
    d
}

/// Fast timings for tests: 50ms debounce, two retries at 10ms linear backoff.
fn quick_config() -> PersistenceConfig {
    PersistenceConfig {
        debounce_delay: Duration::from_millis(50),
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
        ..PersistenceConfig::default()
    }
}

fn new_manager(
    config: PersistenceConfig,
    remote: &Arc<InMemoryRemote>,
) -> PersistenceManager<Arc<InMemoryRemote>> {
    init_tracing();
    PersistenceManager::new(config, Arc::clone(remote))
}

fn markers(remote: &InMemoryRemote) -> Vec<String> {
    remote
        .recorded_saves()
        .iter()
        .map(|payload| payload.input_text.clone())
        .collect()
}

// ==================== basic save path ====================

#[tokio::test(start_paused = true)]
async fn test_manual_save_reaches_remote() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    let receipt = manager
        .save_manual(draft("v1"), Some("first checkpoint"))
        .await
        .unwrap();

    assert_eq!(receipt.version, 2);
    assert!(!receipt.compressed);
    assert_eq!(remote.save_count(), 1);
    assert_eq!(markers(&remote), vec!["v1"]);

    let state = manager.state();
    assert!(!state.is_dirty);
    assert!(!state.is_saving);
    assert!(state.last_saved.is_some());
    assert_eq!(state.local_version, 2);

    let metrics = manager.metrics();
    assert_eq!(metrics.total_saves, 1);
    assert_eq!(metrics.successful_saves, 1);
    assert_eq!(metrics.failed_saves, 0);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_payload_carries_version_bookkeeping() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    manager.save_manual(draft("v1"), None).await.unwrap();
    manager.save_manual(draft("v2"), None).await.unwrap();

    let saves = remote.recorded_saves();
    assert_eq!(saves[0].local_version, 1);
    assert_eq!(saves[0].last_saved, None);
    assert_eq!(saves[1].local_version, 2);
    assert!(saves[1].last_saved.is_some());

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_oversized_payload_marked_for_compression() {
    let remote = Arc::new(InMemoryRemote::new());
    let config = PersistenceConfig {
        compression_threshold: 256,
        ..quick_config()
    };
    let manager = new_manager(config, &remote);

    let mut big = draft("big");
    big.input_text = Some("x".repeat(1024));
    let receipt = manager.save_manual(big, None).await.unwrap();

    assert!(receipt.compressed);
    assert!(remote.recorded_saves()[0].compressed);

    manager.destroy();
}

// ==================== debounce collapsing ====================

#[tokio::test(start_paused = true)]
async fn test_debounce_collapses_to_latest_data() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    manager.save_auto(draft("v1"));
    sleep(Duration::from_millis(10)).await;
    manager.save_auto(draft("v2"));

    // Well past the window: exactly one save, carrying the latest data.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.save_count(), 1);
    assert_eq!(markers(&remote), vec!["v2"]);
    assert!(!manager.state().is_dirty);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_debounce_timing() {
    // Debounce 50ms, two auto-saves 10ms apart: one remote save fires
    // ~50-60ms after the first call, with the second call's data.
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    let started = Instant::now();
    manager.save_auto(draft("v1"));
    sleep(Duration::from_millis(10)).await;
    manager.save_auto(draft("v2"));

    sleep(Duration::from_millis(200)).await;

    assert_eq!(remote.attempt_count(), 1);
    assert_eq!(markers(&remote), vec!["v2"]);

    let elapsed = remote.attempt_instants()[0] - started;
    assert!(
        elapsed >= Duration::from_millis(50) && elapsed <= Duration::from_millis(70),
        "save fired after {elapsed:?}, expected ~50-60ms"
    );

    manager.destroy();
}

// ==================== mutual exclusion & queueing ====================

#[tokio::test(start_paused = true)]
async fn test_at_most_one_save_in_flight() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_save_delay(Some(Duration::from_millis(100)));
    let manager = new_manager(quick_config(), &remote);

    // First manual save acquires the write slot.
    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.save_manual(draft("m1"), None).await })
    };
    sleep(Duration::from_millis(1)).await;
    assert!(manager.state().is_saving);

    // Arrivals while in flight are parked, never run in parallel.
    manager.save_auto(draft("a1"));
    let second = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.save_manual(draft("m2"), None).await })
    };
    sleep(Duration::from_millis(1)).await;
    assert_eq!(manager.state().queued_saves, 2);

    sleep(Duration::from_millis(500)).await;

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(remote.max_concurrent_saves(), 1);
    // Queued manual (priority 1) drains ahead of the earlier auto (2).
    assert_eq!(markers(&remote), vec!["m1", "m2", "a1"]);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_queued_manual_save_resolves_with_real_outcome() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_save_delay(Some(Duration::from_millis(100)));
    let manager = new_manager(quick_config(), &remote);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.save_manual(draft("m1"), None).await })
    };
    sleep(Duration::from_millis(1)).await;

    let receipt = manager.save_manual(draft("m2"), None).await.unwrap();
    assert_eq!(receipt.version, 3);

    assert_eq!(first.await.unwrap().unwrap().version, 2);
    manager.destroy();
}

// ==================== forced saves ====================

#[tokio::test(start_paused = true)]
async fn test_force_save_bypasses_debounce() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    manager.save_auto(draft("debounced"));
    let receipt = manager.force_save(draft("forced"), None).await.unwrap();
    assert_eq!(receipt.version, 2);

    // The debounced save never separately fires afterwards.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.save_count(), 1);
    assert_eq!(markers(&remote), vec!["forced"]);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_force_save_clears_queue_and_runs_after_in_flight_write() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_save_delay(Some(Duration::from_millis(100)));
    let manager = new_manager(quick_config(), &remote);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.save_manual(draft("m1"), None).await })
    };
    sleep(Duration::from_millis(1)).await;

    // Parked behind the in-flight write...
    manager.save_auto(draft("a1"));
    let queued = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.save_manual(draft("m2"), None).await })
    };
    sleep(Duration::from_millis(1)).await;

    // ...until the forced save drops the whole queue.
    let forced = manager.force_save(draft("forced"), None).await.unwrap();
    assert_eq!(forced.version, 3);

    assert!(first.await.unwrap().is_ok());
    assert!(matches!(
        queued.await.unwrap(),
        Err(SaveError::Cancelled)
    ));

    sleep(Duration::from_millis(300)).await;
    assert_eq!(markers(&remote), vec!["m1", "forced"]);
    assert_eq!(remote.max_concurrent_saves(), 1);

    manager.destroy();
}

// ==================== retries ====================

#[tokio::test(start_paused = true)]
async fn test_retry_bound_with_increasing_delays() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.fail_all_saves(true);
    let manager = new_manager(quick_config(), &remote);

    let result = manager.save_manual(draft("doomed"), None).await;
    match result {
        Err(SaveError::Remote {
            attempts,
            will_retry,
            ..
        }) => {
            assert_eq!(attempts, 1);
            assert!(will_retry);
        }
        other => panic!("expected retryable remote error, got {other:?}"),
    }

    // Let the retry cycle play out: max_retries=2 means 3 total attempts.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(remote.attempt_count(), 3);

    let instants = remote.attempt_instants();
    let first_gap = instants[1] - instants[0];
    let second_gap = instants[2] - instants[1];
    assert_eq!(first_gap, Duration::from_millis(10));
    assert_eq!(second_gap, Duration::from_millis(20));
    assert!(second_gap > first_gap);

    // Terminal: slot freed, error recorded, no further attempts.
    let state = manager.state();
    assert!(!state.is_saving);
    assert!(state.save_error.as_deref().unwrap().contains("injected"));
    assert_eq!(manager.metrics().failed_saves, 3);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(remote.attempt_count(), 3);

    // The document stays editable and saveable after exhaustion.
    remote.fail_all_saves(false);
    assert!(manager.save_manual(draft("recovered"), None).await.is_ok());

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_validation_failure_is_not_retried() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    let result = manager.save_manual(DraftDocument::new("  "), None).await;
    assert!(matches!(result, Err(SaveError::Validation { .. })));

    sleep(Duration::from_millis(500)).await;
    assert_eq!(remote.attempt_count(), 0);
    assert!(!manager.state().is_saving);
    assert_eq!(manager.metrics().failed_saves, 1);

    manager.destroy();
}

// ==================== conflict detection & resolution ====================

#[tokio::test(start_paused = true)]
async fn test_conflict_short_circuits_before_the_write() {
    let remote = Arc::new(InMemoryRemote::new());
    let mut server_copy = draft("server edit");
    // Far enough in the future to be newer than any save this test makes.
    server_copy.last_updated = Some(u64::MAX);
    remote.insert_document(server_copy);

    let manager = new_manager(quick_config(), &remote);

    // Establish the conflict baseline.
    let loaded = manager.load_from_server("tok-1", false).await.unwrap();
    assert!(!loaded.from_cache);

    let result = manager.save_manual(draft("local edit"), None).await;
    let conflict_id = match result {
        Err(SaveError::Conflict {
            conflict_id,
            server,
        }) => {
            assert_eq!(server.input_text.as_deref(), Some("server edit"));
            conflict_id
        }
        other => panic!("expected conflict, got {other:?}"),
    };

    // The write was never issued.
    assert_eq!(remote.attempt_count(), 0);
    assert_eq!(manager.metrics().conflicts_detected, 1);
    assert_eq!(manager.active_conflicts().len(), 1);
    assert!(!manager.state().is_saving);

    // Resolve local-wins and retry: the save now goes through.
    let merged = manager
        .resolve_conflict(&conflict_id, &ResolutionStrategy::KeepLocal)
        .unwrap();
    assert_eq!(merged.input_text.as_deref(), Some("local edit"));
    assert_eq!(manager.metrics().conflicts_resolved, 1);
    assert!(manager.active_conflicts().is_empty());

    manager.save_manual(merged, None).await.unwrap();
    assert_eq!(remote.save_count(), 1);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_conflict_detection_disabled_saves_anyway() {
    let remote = Arc::new(InMemoryRemote::new());
    let mut server_copy = draft("server edit");
    server_copy.last_updated = Some(u64::MAX);
    remote.insert_document(server_copy);

    let config = PersistenceConfig {
        enable_conflict_detection: false,
        ..quick_config()
    };
    let manager = new_manager(config, &remote);

    manager.load_from_server("tok-1", false).await.unwrap();
    assert!(manager.save_manual(draft("local"), None).await.is_ok());
    assert_eq!(manager.metrics().conflicts_detected, 0);

    manager.destroy();
}

// ==================== loading & cache ====================

#[tokio::test]
async fn test_cache_ttl_round_trip() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_document(draft("server"));

    let config = PersistenceConfig {
        cache_ttl: Duration::from_millis(80),
        ..quick_config()
    };
    let manager = new_manager(config, &remote);

    let first = manager.load_from_server("tok-1", true).await.unwrap();
    assert!(!first.from_cache);

    let second = manager.load_from_server("tok-1", true).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(remote.load_count(), 1);

    // Real wait past the ttl; this test runs on the unpaused clock.
    sleep(Duration::from_millis(120)).await;
    let third = manager.load_from_server("tok-1", true).await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(remote.load_count(), 2);

    let metrics = manager.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 2);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_use_cache_false_always_fetches() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_document(draft("server"));
    let manager = new_manager(quick_config(), &remote);

    manager.load_from_server("tok-1", true).await.unwrap();
    manager.load_from_server("tok-1", false).await.unwrap();
    assert_eq!(remote.load_count(), 2);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_load_shape_warnings_are_not_fatal() {
    let remote = Arc::new(InMemoryRemote::new());
    let mut incomplete = draft("server");
    incomplete.final_content = Some(draft_core::document::FinalContent {
        layout: None,
        content: None,
    });
    remote.insert_document(incomplete);

    let manager = new_manager(quick_config(), &remote);
    let outcome = manager.load_from_server("tok-1", false).await.unwrap();

    assert_eq!(outcome.warnings.len(), 2);
    assert!(manager.state().has_server_baseline);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_surfaces_and_skips_cache() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    let result = manager.load_from_server("missing", true).await;
    assert!(result.is_err());

    let state = manager.state();
    assert!(state.load_error.as_deref().unwrap().contains("missing"));
    assert_eq!(state.cached_loads, 0);
    assert!(!state.has_server_baseline);

    manager.destroy();
}

// ==================== background timer ====================

#[tokio::test(start_paused = true)]
async fn test_background_save_sweeps_dirty_draft() {
    let remote = Arc::new(InMemoryRemote::new());
    let config = PersistenceConfig {
        background_interval: Duration::from_secs(30),
        // Longer than the background interval, so the sweep gets there first.
        debounce_delay: Duration::from_secs(60),
        ..quick_config()
    };
    let manager = new_manager(config, &remote);

    manager.save_auto(draft("unsaved edit"));
    assert!(manager.state().is_dirty);

    sleep(Duration::from_secs(35)).await;
    assert_eq!(remote.save_count(), 1);
    assert_eq!(markers(&remote), vec!["unsaved edit"]);
    assert!(!manager.state().is_dirty);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_background_timer_is_noop_when_clean() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    sleep(Duration::from_secs(95)).await;
    assert_eq!(remote.attempt_count(), 0);

    manager.destroy();
}

// ==================== versioning ====================

#[tokio::test(start_paused = true)]
async fn test_undo_redo_through_manager() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    for marker in ["a", "b", "c", "d"] {
        manager.save_manual(draft(marker), Some(marker)).await.unwrap();
    }

    assert!(manager.can_undo());
    assert_eq!(manager.undo().unwrap().data.input_text.as_deref(), Some("c"));
    assert_eq!(manager.undo().unwrap().data.input_text.as_deref(), Some("b"));
    assert_eq!(manager.undo().unwrap().data.input_text.as_deref(), Some("a"));
    assert!(manager.undo().is_none());
    assert_eq!(manager.redo().unwrap().data.input_text.as_deref(), Some("b"));

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_auto_snapshot_cadence_on_successful_saves() {
    let remote = Arc::new(InMemoryRemote::new());
    let mut config = quick_config();
    config.version.auto_snapshot_interval = 2;
    let manager = new_manager(config, &remote);

    let events: Arc<Mutex<Vec<PersistenceEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = manager.subscribe(move |event| {
        sink.lock().unwrap().push(event);
    });

    for marker in ["a", "b", "c", "d"] {
        manager.save_manual(draft(marker), None).await.unwrap();
    }

    let auto_snapshots = events
        .lock()
        .unwrap()
        .iter()
        .filter(|event| {
            matches!(
                event,
                PersistenceEvent::SnapshotCreated { origin, .. } if *origin == "auto-save"
            )
        })
        .count();
    assert_eq!(auto_snapshots, 2);

    // 4 manual snapshots + 2 cadence snapshots.
    assert_eq!(manager.history_summary().total_snapshots, 6);

    manager.destroy();
}

// ==================== lifecycle & events ====================

#[tokio::test(start_paused = true)]
async fn test_events_cover_the_save_lifecycle() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.insert_document(draft("server"));
    let manager = new_manager(quick_config(), &remote);

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = manager.subscribe(move |event| {
        let name = match event {
            PersistenceEvent::SaveStarted { .. } => "save_started",
            PersistenceEvent::SaveCompleted { .. } => "save_completed",
            PersistenceEvent::SaveFailed { .. } => "save_failed",
            PersistenceEvent::ConflictDetected { .. } => "conflict_detected",
            PersistenceEvent::ConflictResolved { .. } => "conflict_resolved",
            PersistenceEvent::LoadCompleted { .. } => "load_completed",
            PersistenceEvent::SnapshotCreated { .. } => "snapshot_created",
        };
        sink.lock().unwrap().push(name.to_string());
    });

    manager.load_from_server("tok-1", false).await.unwrap();
    manager.save_manual(draft("v1"), None).await.unwrap();

    let seen = events.lock().unwrap().clone();
    assert!(seen.contains(&"load_completed".to_string()));
    assert!(seen.contains(&"snapshot_created".to_string()));
    assert!(seen.contains(&"save_started".to_string()));
    assert!(seen.contains(&"save_completed".to_string()));

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_destroy_cancels_pending_work() {
    let remote = Arc::new(InMemoryRemote::new());
    let manager = new_manager(quick_config(), &remote);

    manager.save_auto(draft("never saved"));
    manager.destroy();

    // Neither the debounce nor the background timer fires after teardown.
    sleep(Duration::from_secs(120)).await;
    assert_eq!(remote.attempt_count(), 0);

    let state = manager.state();
    assert_eq!(state.queued_saves, 0);
    assert_eq!(state.cached_loads, 0);
}
