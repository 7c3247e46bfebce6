//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cloudpulse::{
    alerts::AlertEngine,
    collector::MetricCollector,
    control::ControlPlane,
    events::{BroadcastPublisher, HubEvent},
    forecast::ForecastClient,
    scaling::{ScalingOrchestrator, SimulatedActuator},
};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn create_mock_metrics_json(cpu_usage: f64, memory_percent: f64) -> serde_json::Value {
    serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "node_id": "agent",
        "cpu": {
            "usage_percent": cpu_usage,
            "load_avg": [0.5, 0.4, 0.3],
            "cores": 4
        },
        "memory": {
            "total": 16_000_000_000u64,
            "available": 8_000_000_000u64,
            "used": 8_000_000_000u64,
            "used_percent": memory_percent
        },
        "network": {
            "bytes_sent": 1000,
            "bytes_recv": 2000,
            "packets_sent": 10,
            "packets_recv": 20
        }
    })
}

/// Agent answering `/metrics` with the given readings
pub async fn spawn_mock_agent(cpu_usage: f64, memory_percent: f64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(create_mock_metrics_json(cpu_usage, memory_percent)),
        )
        .mount(&server)
        .await;
    server
}

/// Agent whose `/metrics` always fails with a 500
pub async fn spawn_failing_agent() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

pub fn forecast_set_json() -> serde_json::Value {
    serde_json::json!({
        "node-a": {
            "cpu": { "predictions": [10.0, 10.0, 20.0, 20.0] },
            "memory": { "predictions": [50.0, 50.0, 50.0, 50.0] }
        }
    })
}

/// Control plane over the given agents with short timeouts and an instant actuator
pub fn create_control_plane(
    agents: Vec<String>,
    forecaster_url: &str,
    forecast_timeout: Duration,
) -> (ControlPlane, BroadcastPublisher) {
    let events = BroadcastPublisher::new(256);

    let collector = MetricCollector::new(agents, Duration::from_secs(2)).unwrap();
    let forecasts = ForecastClient::new(forecaster_url, forecast_timeout, forecast_timeout);
    let scaling = ScalingOrchestrator::new(
        Arc::new(SimulatedActuator::new(Duration::ZERO)),
        Duration::from_secs(2),
    );

    let control = ControlPlane::new(
        Arc::new(collector),
        Arc::new(AlertEngine::new()),
        Arc::new(forecasts),
        Arc::new(scaling),
        Arc::new(events.clone()),
    );

    (control, events)
}

/// Everything published so far, without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<HubEvent>) -> Vec<HubEvent> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
