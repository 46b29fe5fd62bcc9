//! End-to-end registry scenarios.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use switchboard_core::ManualClock;
use switchboard_core::logging::capture_logs;
use switchboard_requests::{
    CancellationToken, ConfigError, CreateRequestParams, JsonFileStore, MemoryStore,
    OrchestratorRequestRegistry, RegistryConfig, RequestError, RequestStatus, RequestStore,
    SqliteStore,
};
use switchboard_settings::{RequestSettings, StoreBackend};

const START: i64 = 1_700_000_000_000;

struct Harness {
    registry: Arc<OrchestratorRequestRegistry>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    harness_with(RegistryConfig::default())
}

fn harness_with(config: RegistryConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(
        OrchestratorRequestRegistry::with_clock(config, store.clone(), clock.clone()).unwrap(),
    );
    Harness {
        registry,
        clock,
        store,
    }
}

fn ask(child: &str, parent: &str) -> CreateRequestParams {
    CreateRequestParams::new(child, parent, "can I merge this?")
}

#[tokio::test]
async fn fourth_open_request_for_child_is_refused() {
    let h = harness();
    for _ in 0..3 {
        let _ = h.registry.create(ask("child", "parent")).unwrap();
    }

    let err = h.registry.create(ask("child", "parent")).unwrap_err();
    assert_matches!(err, RequestError::ChildCapacity { ref child_session_key, .. } if child_session_key == "child");
    assert_eq!(err.category(), "capacity_exceeded");
    assert_eq!(h.registry.list_pending_requests_for_child("child").len(), 3);
}

#[tokio::test]
async fn parent_cap_counts_all_children() {
    let h = harness();
    for i in 0..20 {
        let _ = h.registry.create(ask(&format!("child-{i}"), "parent")).unwrap();
    }
    assert_matches!(
        h.registry.create(ask("child-20", "parent")),
        Err(RequestError::ParentCapacity { limit: 20, .. })
    );
    assert!(h.registry.create(ask("child-20", "other-parent")).is_ok());
}

#[tokio::test]
async fn resolving_frees_a_child_slot() {
    let h = harness();
    let ids: Vec<_> = (0..3)
        .map(|_| h.registry.create(ask("child", "parent")).unwrap())
        .collect();
    let _ = h.registry.resolve(&ids[0], "done", "parent").unwrap();
    assert!(h.registry.create(ask("child", "parent")).is_ok());
}

#[tokio::test]
async fn sixth_creation_in_window_is_rate_limited() {
    let h = harness();
    for _ in 0..5 {
        let id = h.registry.create(ask("child", "parent")).unwrap();
        // keep the child under its pending cap
        let _ = h.registry.resolve(&id, "ok", "parent").unwrap();
        h.clock.advance(Duration::from_millis(100));
    }

    let err = h.registry.create(ask("child", "parent")).unwrap_err();
    assert_matches!(err, RequestError::RateLimited { limit: 5, .. });
    assert!(err.is_retryable());

    h.clock.advance(Duration::from_secs(61));
    assert!(h.registry.create(ask("child", "parent")).is_ok());
}

#[tokio::test]
async fn denied_creation_does_not_consume_rate_slot() {
    let h = harness();
    let mut open = Vec::new();
    for _ in 0..3 {
        open.push(h.registry.create(ask("child", "parent")).unwrap());
    }
    // capacity denials must not count toward the rate window
    for _ in 0..10 {
        assert!(h.registry.create(ask("child", "parent")).is_err());
    }
    for id in &open {
        let _ = h.registry.resolve(id, "ok", "parent").unwrap();
    }
    assert!(h.registry.create(ask("child", "parent")).is_ok());
    assert!(h.registry.create(ask("child", "parent")).is_ok());
}

#[tokio::test]
async fn requested_timeout_is_clamped() {
    let h = harness();
    let short = h.registry.create(ask("a", "parent").with_timeout_ms(1)).unwrap();
    let long = h
        .registry
        .create(ask("b", "parent").with_timeout_ms(10_000_000))
        .unwrap();
    let default = h.registry.create(ask("c", "parent")).unwrap();

    let span = |id: &str| {
        let r = h.registry.get(id).unwrap();
        r.timeout_at - r.created_at
    };
    assert_eq!(span(short.as_str()), 10_000);
    assert_eq!(span(long.as_str()), 3_600_000);
    assert_eq!(span(default.as_str()), 300_000);
}

#[tokio::test]
async fn resolve_after_deadline_loses_to_timeout() {
    let h = harness();
    let id = h
        .registry
        .create(ask("child", "parent").with_timeout_ms(10_000))
        .unwrap();
    h.clock.advance(Duration::from_secs(10));

    let err = h.registry.resolve(&id, "too late", "parent").unwrap_err();
    assert_matches!(err, RequestError::Expired { .. });
    assert!(!err.is_retryable());

    // the sweeper arriving second changes nothing
    assert!(h.registry.sweep().is_empty());
    let record = h.registry.get(&id).unwrap();
    assert_eq!(record.status, RequestStatus::Timeout);
    assert!(record.response.is_none());
}

#[tokio::test]
async fn sweeper_first_then_resolve_is_already_terminal() {
    let h = harness();
    let id = h
        .registry
        .create(ask("child", "parent").with_timeout_ms(10_000))
        .unwrap();
    h.clock.advance(Duration::from_secs(11));

    assert_eq!(h.registry.sweep().timed_out, 1);
    assert_matches!(
        h.registry.resolve(&id, "yes", "parent"),
        Err(RequestError::AlreadyTerminal { status: RequestStatus::Timeout, .. })
    );
}

#[tokio::test]
async fn concurrent_resolvers_settle_exactly_once() {
    let h = harness();
    let id = h.registry.create(ask("child", "parent")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&h.registry);
            let id = id.clone();
            std::thread::spawn(move || registry.resolve(&id, format!("answer {i}"), "parent"))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for loser in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(loser, RequestError::AlreadyTerminal { .. });
    }
    assert_eq!(&h.registry.get(&id).unwrap(), winners[0]);
}

#[tokio::test]
async fn wait_on_resolved_request_returns_immediately() {
    let h = harness();
    let id = h.registry.create(ask("child", "parent")).unwrap();
    let resolved = h.registry.resolve(&id, "yes", "parent").unwrap();

    for _ in 0..3 {
        let record = h
            .registry
            .wait_for_resolution(&id, Duration::ZERO, None)
            .await
            .unwrap();
        assert_eq!(record, resolved);
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_wait_then_resolve_succeeds() {
    let h = harness();
    let id = h.registry.create(ask("child", "parent")).unwrap();
    let token = CancellationToken::new();

    let waiter = {
        let registry = Arc::clone(&h.registry);
        let (id, token) = (id.clone(), token.clone());
        tokio::spawn(async move {
            registry
                .wait_for_resolution(&id, Duration::from_secs(120), Some(&token))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err.category(), "wait_cancelled");
    assert_eq!(h.registry.get(&id).unwrap().status, RequestStatus::Pending);

    let resolved = h.registry.resolve(&id, "go ahead", "parent").unwrap();
    assert_eq!(resolved.status, RequestStatus::Resolved);
}

#[tokio::test(start_paused = true)]
async fn cancel_for_child_wakes_waiters_and_empties_queue() {
    let h = harness();
    let ids: Vec<_> = (0..3)
        .map(|_| h.registry.create(ask("child", "parent")).unwrap())
        .collect();
    let waiters: Vec<_> = ids
        .iter()
        .map(|id| {
            let registry = Arc::clone(&h.registry);
            let id = id.clone();
            tokio::spawn(async move {
                registry
                    .wait_for_resolution(&id, Duration::from_secs(120), None)
                    .await
            })
        })
        .collect();
    tokio::task::yield_now().await;

    let cancelled = h.registry.cancel_requests_for_child("child");
    assert_eq!(cancelled.len(), 3);
    assert!(h.registry.list_pending_requests_for_child("child").is_empty());
    for waiter in waiters {
        let record = waiter.await.unwrap().unwrap();
        assert_eq!(record.status, RequestStatus::Cancelled);
        assert_eq!(record.error.as_deref(), Some("child session terminated"));
    }
    assert_eq!(h.registry.stats().waiters, 0);
}

#[tokio::test]
async fn terminal_records_expire_after_retention() {
    let h = harness();
    let old = h.registry.create(ask("a", "parent")).unwrap();
    let _ = h.registry.cancel_requests_for_child("a");

    h.clock.advance(Duration::from_secs(23 * 3_600));
    let young = h.registry.create(ask("b", "parent")).unwrap();
    let _ = h.registry.resolve(&young, "ok", "parent").unwrap();

    assert_eq!(h.registry.sweep().evicted, 0);
    assert!(h.registry.get(&old).is_some());

    h.clock.advance(Duration::from_secs(3_600 + 1));
    assert_eq!(h.registry.sweep().evicted, 1);
    assert!(h.registry.get(&old).is_none());
    assert!(h.registry.get(&young).is_some());
}

#[tokio::test]
async fn create_collects_garbage_before_counting() {
    let h = harness();
    let stale = h.registry.create(ask("a", "parent")).unwrap();
    let _ = h.registry.resolve(&stale, "ok", "parent").unwrap();
    h.clock.advance(Duration::from_secs(86_400 + 1));

    let _ = h.registry.create(ask("b", "parent")).unwrap();
    assert!(h.registry.get(&stale).is_none());
}

#[tokio::test(start_paused = true)]
async fn unanswered_short_request_times_out() {
    let config = RegistryConfig {
        min_timeout: Duration::from_millis(10),
        ..RegistryConfig::default()
    };
    let h = harness_with(config);
    let id = h
        .registry
        .create(ask("child", "parent").with_timeout_ms(50))
        .unwrap();
    let record = h.registry.get(&id).unwrap();
    assert_eq!(record.timeout_at - record.created_at, 50);

    let record = h
        .registry
        .wait_for_resolution(&id, Duration::from_secs(5), None)
        .await
        .unwrap();
    assert_eq!(record.status, RequestStatus::Timeout);
    assert!(!record.error.unwrap_or_default().is_empty());
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_times_out_unwatched_request() {
    let config = RegistryConfig {
        min_timeout: Duration::from_millis(10),
        sweep_interval: Duration::from_millis(100),
        ..RegistryConfig::default()
    };
    let h = harness_with(config);
    let id = h
        .registry
        .create(ask("child", "parent").with_timeout_ms(50))
        .unwrap();
    assert!(h.registry.start_sweeper());

    h.clock.advance(Duration::from_millis(60));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let record = h.registry.get(&id).unwrap();
    assert_eq!(record.status, RequestStatus::Timeout);
    assert!(record.error.is_some());
    h.registry.shutdown().await;
    assert!(!h.registry.is_sweeper_running());
}

#[tokio::test]
async fn persistence_failure_never_fails_operations() {
    let (logs, _guard) = capture_logs();
    let h = harness();
    h.store.set_failing(true);

    let id = h.registry.create(ask("child", "parent")).unwrap();
    let resolved = h.registry.resolve(&id, "yes", "parent").unwrap();
    assert_eq!(resolved.status, RequestStatus::Resolved);
    h.registry.flush().await;

    assert!(logs.has_event(tracing::Level::WARN, "failed to persist request table"));
    assert_eq!(h.store.save_count(), 0);
}

#[tokio::test]
async fn restart_restores_open_requests_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("requests.json");
    let clock = Arc::new(ManualClock::new(START));

    let id = {
        let registry = OrchestratorRequestRegistry::with_clock(
            RegistryConfig::default(),
            Arc::new(JsonFileStore::new(&path)),
            clock.clone(),
        )
        .unwrap();
        let id = registry.create(ask("child", "parent")).unwrap();
        let _ = registry.mark_notified(&id).unwrap();
        registry.flush().await;
        id
    };

    let registry = OrchestratorRequestRegistry::with_clock(
        RegistryConfig::default(),
        Arc::new(JsonFileStore::new(&path)),
        clock,
    )
    .unwrap();
    assert_eq!(registry.init(), 1);
    assert_eq!(registry.get(&id).unwrap().status, RequestStatus::Notified);

    let resolved = registry.resolve(&id, "after restart", "parent").unwrap();
    assert_eq!(resolved.response.as_deref(), Some("after restart"));
}

#[tokio::test]
async fn restore_never_overwrites_live_state() {
    let h = harness();
    let id = h.registry.create(ask("child", "parent")).unwrap();
    h.registry.flush().await;
    let mut stale = h.store.snapshot();
    let _ = h.registry.resolve(&id, "fresh", "parent").unwrap();

    // the store still has the pending copy
    stale.get_mut(id.as_str()).unwrap().status = RequestStatus::Pending;
    h.store.save(&stale).unwrap();

    assert_eq!(h.registry.init(), 0);
    assert_eq!(h.registry.get(&id).unwrap().status, RequestStatus::Resolved);
}

#[tokio::test]
async fn sqlite_store_round_trips_registry_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("requests.db")).unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let registry =
        OrchestratorRequestRegistry::with_clock(RegistryConfig::default(), store.clone(), clock)
            .unwrap();

    let open = registry.create(ask("a", "parent")).unwrap();
    let second = registry.create(ask("b", "parent")).unwrap();
    let _ = registry.orphan_requests_for_parent("parent");
    let _ = registry.create(ask("a", "parent")).unwrap();
    registry.flush().await;

    let table = store.load().unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table[open.as_str()].status, RequestStatus::Orphaned);
    assert_eq!(
        table[second.as_str()].error.as_deref(),
        Some("parent session terminated")
    );
}

#[tokio::test]
async fn reset_gives_a_clean_slate() {
    let h = harness();
    for _ in 0..3 {
        let _ = h.registry.create(ask("child", "parent")).unwrap();
    }
    let _ = h.registry.init();
    h.registry.reset_for_tests();

    assert_eq!(h.registry.stats().total, 0);
    for _ in 0..3 {
        assert!(h.registry.create(ask("child", "parent")).is_ok());
    }
}

#[tokio::test]
async fn inconsistent_settings_are_refused_at_construction() {
    let settings = RequestSettings {
        min_timeout_ms: 60_000,
        max_timeout_ms: 10_000,
        store_backend: StoreBackend::Memory,
        ..RequestSettings::default()
    };
    let err = OrchestratorRequestRegistry::from_settings(&settings).unwrap_err();
    assert_matches!(err, ConfigError::Settings(_));
    assert!(err.to_string().contains("minTimeoutMs"));
}
