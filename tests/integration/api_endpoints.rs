//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - REST endpoints return the control plane's data
//! - Invalid requests are rejected with 400 and unknown ids with 404
//! - Upstream outages map to 503
//! - WebSocket streaming sends the initial snapshot and live events

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use cloudpulse::{
    api::{ApiConfig, ApiState, router, spawn_api_server},
    control::ControlPlane,
    util::node_id_from_endpoint,
};
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;
use wiremock::MockServer;

use crate::helpers::*;

async fn spawn_test_api(agents: &[&MockServer]) -> (SocketAddr, ControlPlane) {
    let (control, events) = create_control_plane(
        agents.iter().map(|a| a.uri()).collect(),
        "http://127.0.0.1:9/api",
        Duration::from_millis(500),
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };

    let addr = spawn_api_server(config, ApiState::new(control.clone(), events))
        .await
        .unwrap();
    (addr, control)
}

async fn next_json(
    stream: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for WebSocket message")
            .expect("stream ended")
            .expect("WebSocket error");

        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_router_serves_without_listener() {
    let (control, events) = create_control_plane(
        vec![],
        "http://127.0.0.1:9/api",
        Duration::from_millis(500),
    );
    let app = router(ApiState::new(control, events));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/scaling/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["total"], 0);
    assert_eq!(stats["success_rate"], 0.0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let agent = spawn_mock_agent(30.0, 40.0).await;
    let (addr, control) = spawn_test_api(&[&agent]).await;
    control.run_metrics_cycle().await;

    let response = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["serviceHealth"]["metricCollector"], true);
    assert_eq!(json["serviceHealth"]["forecastClient"], false);
    assert_eq!(json["serviceHealth"]["overall"], "degraded");
    assert_eq!(json["nodeHealth"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_metrics_and_nodes_endpoints() {
    let agent = spawn_mock_agent(30.0, 40.0).await;
    let broken = spawn_failing_agent().await;
    let (addr, control) = spawn_test_api(&[&agent, &broken]).await;
    control.run_metrics_cycle().await;

    let metrics: Value = reqwest::get(format!("http://{addr}/api/metrics"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics.as_array().unwrap().len(), 1);
    assert_eq!(metrics[0]["cpu"]["usage_percent"], 30.0);

    let summary: Value = reqwest::get(format!("http://{addr}/api/metrics/summary"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["nodes"], 1);
    assert_eq!(summary["averageCpu"], 30.0);
    assert_eq!(summary["totalNetwork"]["bytes_recv"], 2000);

    let nodes: Value = reqwest::get(format!("http://{addr}/api/nodes"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let nodes = nodes.as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["status"], "healthy");
    assert_eq!(nodes[1]["status"], "unhealthy");
}

#[tokio::test]
async fn test_alert_listing_and_filters() {
    let hot = spawn_mock_agent(90.0, 40.0).await;
    let broken = spawn_failing_agent().await;
    let (addr, control) = spawn_test_api(&[&hot, &broken]).await;
    control.run_metrics_cycle().await;

    let all: Value = reqwest::get(format!("http://{addr}/api/alerts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let critical: Value = reqwest::get(format!("http://{addr}/api/alerts?severity=critical"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let critical = critical.as_array().unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0]["rule_id"], "node_down");

    let hot_id = node_id_from_endpoint(&hot.uri());
    let by_node: Value = reqwest::get(format!("http://{addr}/api/alerts?node={hot_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let by_node = by_node.as_array().unwrap();
    assert_eq!(by_node.len(), 1);
    assert_eq!(by_node[0]["rule_id"], "cpu_high");

    let combined: Value =
        reqwest::get(format!("http://{addr}/api/alerts?severity=critical&node={hot_id}"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(combined, json!([]));

    let response = reqwest::get(format!("http://{addr}/api/alerts?severity=urgent"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_acknowledge_and_resolve_endpoints() {
    let broken = spawn_failing_agent().await;
    let (addr, control) = spawn_test_api(&[&broken]).await;
    control.run_metrics_cycle().await;

    let id = control.active_alerts().await[0].id.to_string();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/alerts/{id}/acknowledge"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);

    let response = client
        .post(format!("http://{addr}/api/alerts/{id}/resolve"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value = reqwest::get(format!("http://{addr}/api/alerts/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["active"], 0);
    assert_eq!(stats["acknowledged"], 1);
    assert_eq!(stats["resolved"], 1);

    let response = client
        .post(format!("http://{addr}/api/alerts/missing:node:0/acknowledge"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scale_endpoint() {
    let (addr, _control) = spawn_test_api(&[]).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/scale"))
        .json(&json!({ "nodeId": "node-a", "action": "scale_up", "replicas": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let action: Value = response.json().await.unwrap();
    assert_eq!(action["node_id"], "node-a");
    assert_eq!(action["action"], "scale_up");
    assert_eq!(action["status"], "completed");
    assert_eq!(action["result"]["success"], true);

    let id = action["id"].as_str().unwrap();
    let response = reqwest::get(format!("http://{addr}/api/scaling/actions/{id}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let history: Value = reqwest::get(format!("http://{addr}/api/scaling/history?limit=10"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    let stats: Value = reqwest::get(format!("http://{addr}/api/scaling/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["success_rate"], 100.0);
}

#[tokio::test]
async fn test_scale_endpoint_rejects_invalid_requests() {
    let (addr, control) = spawn_test_api(&[]).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "nodeId": "node-a", "action": "scale_sideways", "replicas": 3 }),
        json!({ "nodeId": "node-a", "action": "scale_up", "replicas": 0 }),
        json!({ "nodeId": "node-a", "action": "scale_up", "replicas": 101 }),
        json!({ "nodeId": "", "action": "scale_up", "replicas": 1 }),
    ] {
        let response = client
            .post(format!("http://{addr}/api/scale"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
    }

    assert_eq!(control.scaling.stats().await.total, 0);

    let response = reqwest::get(format!("http://{addr}/api/scaling/actions/node-a:0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forecast_endpoints_without_forecaster() {
    let (addr, _control) = spawn_test_api(&[]).await;

    let response = reqwest::get(format!("http://{addr}/api/forecasts"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Details stay in the server log
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "upstream service unavailable");

    let summary: Value = reqwest::get(format!("http://{addr}/api/forecasts/summary"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary, json!({}));

    let anomalies: Value = reqwest::get(format!("http://{addr}/api/anomalies"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anomalies, json!({ "anomalies": [] }));

    let response = reqwest::get(format!("http://{addr}/api/model-performance"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_websocket_sends_initial_data_then_events() {
    let agent = spawn_mock_agent(30.0, 40.0).await;
    let (addr, control) = spawn_test_api(&[&agent]).await;
    control.run_metrics_cycle().await;

    let (mut stream, _) = connect_async(format!("ws://{addr}/api/stream"))
        .await
        .unwrap();

    let initial = next_json(&mut stream).await;
    assert_eq!(initial["event"], "initialData");
    assert_eq!(initial["payload"]["metrics"].as_array().unwrap().len(), 1);
    assert_eq!(initial["payload"]["alerts"], json!([]));
    assert_eq!(initial["payload"]["forecasts"], Value::Null);

    control.run_health_cycle().await;

    let update = next_json(&mut stream).await;
    assert_eq!(update["event"], "healthUpdate");
    assert_eq!(update["payload"]["serviceHealth"]["metricCollector"], true);
}
