//! Health check endpoint

use axum::{Json, extract::State};

use crate::{api::state::ApiState, control::SystemHealth};

/// GET /api/health
///
/// Returns service health for the collector and forecaster plus per-node health
pub async fn system_health(State(state): State<ApiState>) -> Json<SystemHealth> {
    Json(state.control.check_system_health().await)
}
