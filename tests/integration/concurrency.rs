//! Concurrency tests for the control plane
//!
//! These tests verify that:
//! - Overlapping metrics cycles leave consistent stores
//! - Concurrent acknowledgements and scale requests are all recorded
//! - Readers never block on writers for long

use std::time::Duration;

use cloudpulse::scaling::ScalingStatus;
use futures::future::join_all;

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_metrics_cycles() {
    let agents = vec![
        spawn_mock_agent(20.0, 30.0).await,
        spawn_mock_agent(40.0, 50.0).await,
        spawn_mock_agent(60.0, 70.0).await,
    ];

    let (control, _events) = create_control_plane(
        agents.iter().map(|a| a.uri()).collect(),
        "http://127.0.0.1:9/api",
        Duration::from_millis(500),
    );

    let cycles = (0..10).map(|_| {
        let control = control.clone();
        tokio::spawn(async move { control.run_metrics_cycle().await })
    });

    for report in join_all(cycles).await {
        let report = report.unwrap();
        assert_eq!(report.nodes, 3);
        assert_eq!(report.collected, 3);
    }

    // One cache entry per agent, regardless of how many cycles raced
    assert_eq!(control.all_metrics().await.len(), 3);
    assert!(control.collector.is_operational().await);
}

#[tokio::test]
async fn test_concurrent_acknowledgements() {
    let agents = vec![
        spawn_failing_agent().await,
        spawn_failing_agent().await,
        spawn_failing_agent().await,
        spawn_failing_agent().await,
    ];

    let (control, _events) = create_control_plane(
        agents.iter().map(|a| a.uri()).collect(),
        "http://127.0.0.1:9/api",
        Duration::from_millis(500),
    );
    control.run_metrics_cycle().await;

    let ids: Vec<String> = control
        .active_alerts()
        .await
        .iter()
        .map(|a| a.id.to_string())
        .collect();
    assert_eq!(ids.len(), 4);

    // Each alert acknowledged twice at once; both calls must succeed
    let acks = ids.iter().chain(ids.iter()).map(|id| {
        let control = control.clone();
        let id = id.clone();
        tokio::spawn(async move { control.acknowledge_alert(&id).await })
    });

    for acked in join_all(acks).await {
        assert!(acked.unwrap());
    }

    let stats = control.alerts.stats().await;
    assert_eq!(stats.acknowledged, 4);
    assert_eq!(stats.active, 4);
}

#[tokio::test]
async fn test_concurrent_scale_requests() {
    let (control, _events) = create_control_plane(
        vec![],
        "http://127.0.0.1:9/api",
        Duration::from_millis(500),
    );

    let requests = (0..20).map(|i| {
        let control = control.clone();
        tokio::spawn(async move {
            control
                .scale_node(&format!("node-{i}"), "scale_up", 2)
                .await
        })
    });

    for action in join_all(requests).await {
        let action = action.unwrap().unwrap();
        assert_eq!(action.status, ScalingStatus::Completed);
    }

    let stats = control.scaling.stats().await;
    assert_eq!(stats.total, 20);
    assert_eq!(stats.completed, 20);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.success_rate, 100.0);

    assert_eq!(control.scaling.history(5).await.len(), 5);
}
