//! Tier ordering, fallthrough, and cancellation behavior of the orchestrator

mod common;

use common::{candidate, gateway, gateway_with_body, harness, Behavior};
use std::time::Duration;
use unamentis_discovery::{CacheStore, DiscoveryMethod, DiscoveryState, DiscoveryTier};

#[tokio::test]
async fn test_healthy_cached_candidate_stops_discovery() {
    let mock = gateway(200).await;
    let h = harness(
        Behavior::Return(Some(candidate(&mock, DiscoveryMethod::Cached))),
        Behavior::Return(None),
        Behavior::Return(None),
    );

    let server = h.manager.start_discovery().await.expect("cached server");

    assert_eq!(h.calls(), vec![DiscoveryTier::Cached]);
    assert_eq!(server.discovery_method, DiscoveryMethod::Cached);
    assert_eq!(h.manager.connected_server(), Some(server.clone()));
    assert_eq!(h.manager.state(), DiscoveryState::Connected { server: server.clone() });
    assert_eq!(h.manager.progress(), 1.0);
    assert_eq!(h.manager.discovered_servers(), vec![server.clone()]);

    let record = h.store.load().unwrap().expect("record persisted");
    assert_eq!(record.port, server.port);
}

#[tokio::test]
async fn test_unhealthy_cached_candidate_falls_through_to_nsd() {
    let down = gateway(503).await;
    let up = gateway(200).await;
    let h = harness(
        Behavior::Return(Some(candidate(&down, DiscoveryMethod::Cached))),
        Behavior::Return(Some(candidate(&up, DiscoveryMethod::Nsd))),
        Behavior::Return(None),
    );

    let server = h.manager.start_discovery().await.expect("nsd server");

    assert_eq!(h.calls(), vec![DiscoveryTier::Cached, DiscoveryTier::Nsd]);
    assert_eq!(server.discovery_method, DiscoveryMethod::Nsd);
    assert_eq!(server.port, up.address().port());
    assert_eq!(h.store.load().unwrap().unwrap().port, up.address().port());
}

#[tokio::test]
async fn test_all_tiers_empty_requires_manual_config() {
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );

    assert!(h.manager.start_discovery().await.is_none());

    assert_eq!(
        h.calls(),
        vec![DiscoveryTier::Cached, DiscoveryTier::Nsd, DiscoveryTier::SubnetScan]
    );
    assert_eq!(h.manager.state(), DiscoveryState::ManualConfigRequired);
    assert_eq!(h.manager.progress(), 1.0);
    assert!(h.manager.connected_server().is_none());
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_tier_error_does_not_propagate() {
    let mock = gateway(200).await;
    let h = harness(
        Behavior::Fail,
        Behavior::Fail,
        Behavior::Return(Some(candidate(&mock, DiscoveryMethod::SubnetScan))),
    );

    let server = h.manager.start_discovery().await.expect("subnet server");

    assert_eq!(
        h.calls(),
        vec![DiscoveryTier::Cached, DiscoveryTier::Nsd, DiscoveryTier::SubnetScan]
    );
    assert_eq!(server.discovery_method, DiscoveryMethod::SubnetScan);
    assert!(h.manager.state().is_connected());
}

#[tokio::test]
async fn test_cancelled_tier_halts_discovery() {
    let mock = gateway(200).await;
    let h = harness(
        Behavior::Return(None),
        Behavior::Cancelled,
        Behavior::Return(Some(candidate(&mock, DiscoveryMethod::SubnetScan))),
    );

    assert!(h.manager.start_discovery().await.is_none());

    assert_eq!(h.calls(), vec![DiscoveryTier::Cached, DiscoveryTier::Nsd]);
    assert_eq!(h.manager.state(), DiscoveryState::Idle);
    assert!(h.manager.connected_server().is_none());
}

#[tokio::test]
async fn test_cancel_discovery_aborts_in_flight_run() {
    let mock = gateway(200).await;
    let h = harness(
        Behavior::Return(None),
        Behavior::Hang,
        Behavior::Return(Some(candidate(&mock, DiscoveryMethod::SubnetScan))),
    );

    let mut states = h.manager.subscribe_state();
    let run = h.manager.start_discovery_in_background();

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == DiscoveryState::TryingTier { tier: DiscoveryTier::Nsd }),
    )
    .await
    .expect("reached NSD tier")
    .unwrap();

    h.manager.cancel_discovery();

    assert!(run.await.unwrap().is_none());
    assert_eq!(h.calls(), vec![DiscoveryTier::Cached, DiscoveryTier::Nsd]);
    assert_eq!(h.manager.state(), DiscoveryState::Idle);
}

#[tokio::test]
async fn test_cancel_discovery_reaches_every_source_when_idle() {
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );

    h.manager.cancel_discovery();
    h.manager.cancel_discovery();

    for source in &h.sources {
        assert_eq!(source.cancel_count(), 2);
    }
    assert_eq!(h.manager.state(), DiscoveryState::Idle);
}

#[tokio::test]
async fn test_progress_tracks_current_tier() {
    let h = harness(Behavior::Return(None), Behavior::Hang, Behavior::Return(None));

    let mut states = h.manager.subscribe_state();
    let progress = h.manager.subscribe_progress();
    let run = h.manager.start_discovery_in_background();

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == DiscoveryState::TryingTier { tier: DiscoveryTier::Nsd }),
    )
    .await
    .expect("reached NSD tier")
    .unwrap();

    let current = *progress.borrow();
    assert!((current - 1.0 / 3.0).abs() < f32::EPSILON);

    h.manager.cancel_discovery();
    run.await.unwrap();
}

#[tokio::test]
async fn test_discovered_servers_accumulate_across_runs() {
    let first = gateway(200).await;
    let h = harness(
        Behavior::Return(Some(candidate(&first, DiscoveryMethod::Cached))),
        Behavior::Return(None),
        Behavior::Return(None),
    );

    let a = h.manager.start_discovery().await.unwrap();
    let b = h.manager.retry_discovery().await.unwrap();

    assert_eq!(h.manager.discovered_servers().len(), 2);
    assert_eq!(h.manager.connected_server(), Some(b));
    assert!(h.manager.discovered_servers().contains(&a));
}

#[tokio::test]
async fn test_clear_cache_resets_state_but_keeps_history() {
    let mock = gateway(200).await;
    let h = harness(
        Behavior::Return(Some(candidate(&mock, DiscoveryMethod::Cached))),
        Behavior::Return(None),
        Behavior::Return(None),
    );
    h.manager.start_discovery().await.unwrap();
    assert!(h.store.load().unwrap().is_some());

    h.manager.clear_cache().unwrap();

    assert!(h.store.load().unwrap().is_none());
    assert!(h.manager.connected_server().is_none());
    assert_eq!(h.manager.state(), DiscoveryState::Idle);
    assert_eq!(h.manager.discovered_servers().len(), 1);
}

#[tokio::test]
async fn test_configure_manually_success() {
    let mock = gateway_with_body(200, r#"{"server_name":"My Mac"}"#).await;
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );
    let addr = mock.address();

    let server = h
        .manager
        .configure_manually(&addr.ip().to_string(), addr.port(), None)
        .await
        .expect("manual server");

    assert!(h.calls().is_empty());
    assert_eq!(server.discovery_method, DiscoveryMethod::Manual);
    assert_eq!(server.name, "My Mac");
    assert_eq!(h.manager.state(), DiscoveryState::Connected { server: server.clone() });

    let record = h.store.load().unwrap().expect("manual server persisted");
    assert_eq!(record.method, DiscoveryMethod::Manual);
    assert_eq!(record.port, addr.port());
}

#[tokio::test]
async fn test_configure_manually_explicit_name_wins() {
    let mock = gateway_with_body(200, r#"{"server_name":"My Mac"}"#).await;
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );
    let addr = mock.address();

    let server = h
        .manager
        .configure_manually(&addr.ip().to_string(), addr.port(), Some("Office"))
        .await
        .unwrap();
    assert_eq!(server.name, "Office");
}

#[tokio::test]
async fn test_configure_manually_unhealthy_fails() {
    let mock = gateway(503).await;
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );
    let addr = mock.address();

    let result = h
        .manager
        .configure_manually(&addr.ip().to_string(), addr.port(), None)
        .await;

    assert!(result.is_none());
    assert!(matches!(h.manager.state(), DiscoveryState::Failed { .. }));
    assert!(h.store.load().unwrap().is_none());
    assert!(h.manager.connected_server().is_none());
}

#[tokio::test]
async fn test_configure_manually_rejects_invalid_address() {
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );

    assert!(h.manager.configure_manually("", 11400, None).await.is_none());
    assert!(matches!(h.manager.state(), DiscoveryState::Failed { .. }));

    assert!(h.manager.configure_manually("10.0.0.2", 0, None).await.is_none());
    assert!(matches!(h.manager.state(), DiscoveryState::Failed { .. }));
}

#[tokio::test]
async fn test_cancel_right_after_spawn_stops_run() {
    let h = harness(Behavior::Return(None), Behavior::Hang, Behavior::Return(None));

    let run = h.manager.start_discovery_in_background();
    h.manager.cancel_discovery();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancelled run should finish")
        .unwrap();

    assert!(result.is_none());
    assert!(h.calls().is_empty());
    assert_eq!(h.manager.state(), DiscoveryState::Idle);
}

#[tokio::test]
async fn test_cancel_reaches_run_queued_behind_another() {
    let h = harness(Behavior::Return(None), Behavior::Hang, Behavior::Return(None));

    let mut states = h.manager.subscribe_state();
    let first = h.manager.start_discovery_in_background();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == DiscoveryState::TryingTier { tier: DiscoveryTier::Nsd }),
    )
    .await
    .expect("reached NSD tier")
    .unwrap();

    let queued = h.manager.start_discovery_in_background();
    tokio::task::yield_now().await;
    h.manager.cancel_discovery();

    let (first, queued) = tokio::time::timeout(Duration::from_secs(5), async {
        (first.await.unwrap(), queued.await.unwrap())
    })
    .await
    .expect("both runs should finish");

    assert!(first.is_none());
    assert!(queued.is_none());
    assert_eq!(h.calls(), vec![DiscoveryTier::Cached, DiscoveryTier::Nsd]);
    assert_eq!(h.manager.state(), DiscoveryState::Idle);
}

#[tokio::test]
async fn test_run_started_after_cancel_is_not_cancelled() {
    let h = harness(
        Behavior::Return(None),
        Behavior::Return(None),
        Behavior::Return(None),
    );

    h.manager.cancel_discovery();
    assert!(h.manager.start_discovery().await.is_none());

    assert_eq!(h.calls().len(), 3);
    assert_eq!(h.manager.state(), DiscoveryState::ManualConfigRequired);
}

#[tokio::test]
async fn test_configure_manually_supersedes_in_flight_run() {
    let mock = gateway(200).await;
    let h = harness(Behavior::Return(None), Behavior::Hang, Behavior::Return(None));

    let mut states = h.manager.subscribe_state();
    let run = h.manager.start_discovery_in_background();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == DiscoveryState::TryingTier { tier: DiscoveryTier::Nsd }),
    )
    .await
    .expect("reached NSD tier")
    .unwrap();

    let addr = mock.address();
    let server = h
        .manager
        .configure_manually(&addr.ip().to_string(), addr.port(), Some("Desk"))
        .await
        .expect("manual server");

    assert!(run.await.unwrap().is_none());
    assert_eq!(h.manager.state(), DiscoveryState::Connected { server: server.clone() });
    assert_eq!(h.manager.connected_server(), Some(server));
    assert_eq!(h.calls(), vec![DiscoveryTier::Cached, DiscoveryTier::Nsd]);
}
