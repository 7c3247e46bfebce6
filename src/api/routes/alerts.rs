//! Alert endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    alerts::{Alert, AlertStats, Severity},
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
    },
};

/// Query parameters for the alert listing
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    /// Only alerts of this severity
    pub severity: Option<String>,

    /// Only alerts raised for this node
    pub node: Option<String>,
}

/// GET /api/alerts
///
/// Returns active (unresolved) alerts, newest first
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Json<Vec<Alert>>> {
    let severity = query
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(ApiError::InvalidRequest)?;

    let alerts = state
        .control
        .filtered_alerts(severity, query.node.as_deref())
        .await;

    Ok(Json(alerts))
}

/// GET /api/alerts/stats
pub async fn alert_stats(State(state): State<ApiState>) -> Json<AlertStats> {
    Json(state.control.alerts.stats().await)
}

/// POST /api/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.control.acknowledge_alert(&id).await {
        return Err(ApiError::NotFound(format!("alert {id} not found")));
    }

    Ok(Json(json!({ "success": true, "id": id })))
}

/// POST /api/alerts/:id/resolve
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.control.resolve_alert(&id).await {
        return Err(ApiError::NotFound(format!("alert {id} not found")));
    }

    Ok(Json(json!({ "success": true, "id": id })))
}
