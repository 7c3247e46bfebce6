//! Scaling endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{
    api::{error::ApiResult, state::ApiState},
    control::ScaleRequest,
    scaling::{ScalingAction, ScalingStats},
};

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// POST /api/scale
///
/// Body: `{"nodeId": "...", "action": "scale_up" | "scale_down", "replicas": n}`.
/// Actuator failures are reported in the returned action, not as an HTTP error.
pub async fn scale_node(
    State(state): State<ApiState>,
    Json(request): Json<ScaleRequest>,
) -> ApiResult<Json<ScalingAction>> {
    Ok(Json(state.control.scale(request).await?))
}

/// GET /api/scaling/history
pub async fn scaling_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ScalingAction>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(state.control.scaling.history(limit).await)
}

/// GET /api/scaling/actions/:id
pub async fn get_scaling_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScalingAction>> {
    Ok(Json(state.control.scaling_action(&id).await?))
}

/// GET /api/scaling/stats
pub async fn scaling_stats(State(state): State<ApiState>) -> Json<ScalingStats> {
    Json(state.control.scaling.stats().await)
}
