//! Node metrics and status endpoints

use axum::{Json, extract::State};

use crate::{
    NodeMetrics,
    api::state::ApiState,
    collector::NodeHealth,
    control::ClusterSummary,
};

/// GET /api/metrics
///
/// Returns the last metrics collected from every agent that has answered at least once
pub async fn all_metrics(State(state): State<ApiState>) -> Json<Vec<NodeMetrics>> {
    Json(state.control.all_metrics().await)
}

/// GET /api/metrics/summary
pub async fn metrics_summary(State(state): State<ApiState>) -> Json<ClusterSummary> {
    Json(state.control.cluster_summary().await)
}

/// GET /api/nodes
pub async fn node_status(State(state): State<ApiState>) -> Json<Vec<NodeHealth>> {
    Json(state.control.node_status().await)
}
