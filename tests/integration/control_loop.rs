//! End-to-end tests of the metrics, forecast and health cycles
//!
//! These tests verify that:
//! - A metrics cycle collects, evaluates alerts and publishes in order
//! - Failing agents surface as `node_down` without stopping the cycle
//! - Auto-scaling runs only when enabled
//! - Alert acknowledgement and resolution flow through to subscribers

use std::time::Duration;

use cloudpulse::{
    control::OverallStatus,
    events::EventKind,
    scaling::{ScaleDirection, ScalingStatus, ScalingTrigger},
    util::node_id_from_endpoint,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const UNREACHABLE_FORECASTER: &str = "http://127.0.0.1:9/api";

#[tokio::test]
async fn test_metrics_cycle_with_failing_agent() {
    let hot = spawn_mock_agent(97.0, 40.0).await;
    let calm = spawn_mock_agent(30.0, 40.0).await;
    let broken = spawn_failing_agent().await;

    let (control, events) = create_control_plane(
        vec![hot.uri(), calm.uri(), broken.uri()],
        UNREACHABLE_FORECASTER,
        Duration::from_millis(500),
    );
    let mut rx = events.subscribe();

    let report = control.run_metrics_cycle().await;

    assert_eq!(report.nodes, 3);
    assert_eq!(report.collected, 2);
    assert_eq!(report.new_alerts, 3);
    assert_eq!(report.scaling_actions, 0);

    let hot_id = node_id_from_endpoint(&hot.uri());
    let broken_id = node_id_from_endpoint(&broken.uri());

    let mut raised: Vec<(String, String)> = control
        .active_alerts()
        .await
        .into_iter()
        .map(|a| (a.rule_id, a.node_id))
        .collect();
    raised.sort();

    let mut expected = vec![
        ("cpu_critical".to_string(), hot_id.clone()),
        ("cpu_high".to_string(), hot_id),
        ("node_down".to_string(), broken_id),
    ];
    expected.sort();
    assert_eq!(raised, expected);

    let published = drain_events(&mut rx);
    let kinds: Vec<EventKind> = published.iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::MetricsUpdate, EventKind::NewAlerts]);
    assert_eq!(published[0].payload.as_array().unwrap().len(), 2);
    assert_eq!(published[1].payload.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_quiet_cycle_publishes_only_metrics() {
    let calm = spawn_mock_agent(30.0, 40.0).await;

    let (control, events) = create_control_plane(
        vec![calm.uri()],
        UNREACHABLE_FORECASTER,
        Duration::from_millis(500),
    );
    let mut rx = events.subscribe();

    let report = control.run_metrics_cycle().await;
    assert_eq!(report.new_alerts, 0);

    let kinds: Vec<EventKind> = drain_events(&mut rx).iter().map(|e| e.event).collect();
    assert_eq!(kinds, vec![EventKind::MetricsUpdate]);
}

#[tokio::test]
async fn test_repeated_detection_raises_new_incidents() {
    let hot = spawn_mock_agent(90.0, 40.0).await;

    let (control, _events) = create_control_plane(
        vec![hot.uri()],
        UNREACHABLE_FORECASTER,
        Duration::from_millis(500),
    );

    control.run_metrics_cycle().await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    control.run_metrics_cycle().await;

    let stats = control.alerts.stats().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 2);
}

#[tokio::test]
async fn test_auto_scale_cycle_scales_hot_node_once() {
    let hot = spawn_mock_agent(90.0, 40.0).await;
    let calm = spawn_mock_agent(50.0, 40.0).await;

    let (control, events) = create_control_plane(
        vec![hot.uri(), calm.uri()],
        UNREACHABLE_FORECASTER,
        Duration::from_millis(500),
    );
    let control = control.with_auto_scale(true);
    let mut rx = events.subscribe();

    let report = control.run_metrics_cycle().await;
    assert_eq!(report.scaling_actions, 1);

    let history = control.scaling.history(10).await;
    assert_eq!(history.len(), 1);

    let action = &history[0];
    assert_eq!(action.node_id, node_id_from_endpoint(&hot.uri()));
    assert_eq!(action.action, ScaleDirection::ScaleUp);
    assert_eq!(action.replicas, 2);
    assert_eq!(action.status, ScalingStatus::Completed);
    assert_eq!(
        action.trigger,
        ScalingTrigger::Rule {
            rule_id: "cpu_scale_up".to_string()
        }
    );

    let kinds: Vec<EventKind> = drain_events(&mut rx).iter().map(|e| e.event).collect();
    assert!(kinds.contains(&EventKind::ScalingUpdate));
}

#[tokio::test]
async fn test_acknowledge_then_resolve() {
    let broken = spawn_failing_agent().await;

    let (control, events) = create_control_plane(
        vec![broken.uri()],
        UNREACHABLE_FORECASTER,
        Duration::from_millis(500),
    );
    control.run_metrics_cycle().await;

    let alert = control.active_alerts().await.remove(0);
    let id = alert.id.to_string();

    let mut rx = events.subscribe();
    assert!(control.acknowledge_alert(&id).await);

    let published = drain_events(&mut rx);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event, EventKind::AlertAcknowledged);
    assert_eq!(published[0].payload["acknowledged"], true);

    // Acknowledged alerts stay active until resolved
    assert_eq!(control.active_alerts().await.len(), 1);

    assert!(control.resolve_alert(&id).await);
    assert!(control.active_alerts().await.is_empty());

    let stats = control.alerts.stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.resolved, 1);
}

#[tokio::test]
async fn test_forecast_cycle_publishes_update() {
    let forecaster = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_set_json()))
        .mount(&forecaster)
        .await;

    let (control, events) = create_control_plane(
        vec![],
        &format!("{}/api", forecaster.uri()),
        Duration::from_millis(500),
    );
    let mut rx = events.subscribe();

    control.run_forecast_cycle().await.unwrap();

    let published = drain_events(&mut rx);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event, EventKind::ForecastUpdate);
    assert!(published[0].payload.get("node-a").is_some());

    assert!(control.forecasts.is_healthy().await);
}

#[tokio::test]
async fn test_health_cycle_reflects_components() {
    let calm = spawn_mock_agent(30.0, 40.0).await;

    let (control, events) = create_control_plane(
        vec![calm.uri()],
        UNREACHABLE_FORECASTER,
        Duration::from_millis(500),
    );
    let mut rx = events.subscribe();

    let before = control.run_health_cycle().await;
    assert_eq!(before.service_health.overall, OverallStatus::Unhealthy);

    control.run_metrics_cycle().await;
    let after = control.run_health_cycle().await;
    assert!(after.service_health.metric_collector);
    assert!(!after.service_health.forecast_client);
    assert_eq!(after.service_health.overall, OverallStatus::Degraded);

    let health_events = drain_events(&mut rx)
        .into_iter()
        .filter(|e| e.event == EventKind::HealthUpdate)
        .count();
    assert_eq!(health_events, 2);
}
