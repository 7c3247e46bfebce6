//! Forecast endpoints

use std::collections::BTreeMap;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
    },
    forecast::{ForecastSet, MetricSummary},
};

/// GET /api/forecasts
///
/// Served from cache when the forecaster is unreachable; 503 if nothing was ever fetched
pub async fn get_forecasts(State(state): State<ApiState>) -> ApiResult<Json<ForecastSet>> {
    Ok(Json(state.control.forecasts().await?))
}

/// GET /api/forecasts/summary
pub async fn forecast_summary(
    State(state): State<ApiState>,
) -> Json<BTreeMap<String, MetricSummary>> {
    Json(state.control.forecasts.summarize().await)
}

/// GET /api/anomalies
pub async fn get_anomalies(State(state): State<ApiState>) -> Json<Value> {
    let anomalies = state.control.forecasts.anomalies().await;
    Json(json!({ "anomalies": anomalies }))
}

/// GET /api/model-performance
pub async fn model_performance(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    state
        .control
        .forecasts
        .model_performance()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Unavailable("model performance unavailable".to_string()))
}
