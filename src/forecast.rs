//! ForecastClient - Reads predictions from the external forecasting service
//!
//! The latest successful response is cached as a whole. `fetch` falls back to
//! that cache when the service is unreachable; `refresh` never does, since a
//! failed recompute means the service is broken rather than slow.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::util::join_url;

/// Number of future steps requested on refresh
pub const FORECAST_HORIZON: usize = 24;

/// Models the forecaster is asked to ensemble on refresh
pub const FORECAST_MODELS: [&str; 2] = ["lstm", "prophet"];

/// Metrics covered by [`ForecastClient::summarize`]
pub const TRACKED_METRICS: [&str; 3] = ["cpu", "memory", "network"];

/// A cache older than this makes the client report unhealthy
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Relative change (percent) between series halves that counts as a trend
const TREND_THRESHOLD: f64 = 5.0;

/// Forecaster output keyed by node id. The per-node payload is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastSet {
    pub nodes: BTreeMap<String, Value>,
}

impl ForecastSet {
    /// Predicted points for one node and metric.
    ///
    /// Accepts both `{"cpu": {"predictions": [..]}}` and `{"cpu": [..]}`.
    pub fn predictions(&self, node_id: &str, metric: &str) -> Vec<f64> {
        let Some(entry) = self.nodes.get(node_id).and_then(|node| node.get(metric)) else {
            return vec![];
        };

        let points = entry.get("predictions").unwrap_or(entry);
        points
            .as_array()
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub trend: Trend,
}

/// Compare the means of both halves of a series.
///
/// Odd-length series put the middle point in the second half.
pub fn classify_trend(series: &[f64]) -> Trend {
    if series.len() < 2 {
        return Trend::Stable;
    }

    let (first, second) = series.split_at(series.len() / 2);
    let first_mean = mean(first);
    let second_mean = mean(second);

    if first_mean == 0.0 {
        return match second_mean.partial_cmp(&0.0) {
            Some(std::cmp::Ordering::Greater) => Trend::Increasing,
            Some(std::cmp::Ordering::Less) => Trend::Decreasing,
            _ => Trend::Stable,
        };
    }

    let change = (second_mean - first_mean) / first_mean.abs() * 100.0;
    if change > TREND_THRESHOLD {
        Trend::Increasing
    } else if change < -TREND_THRESHOLD {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Step-wise mean across several series of possibly different lengths.
fn stepwise_mean(series: &[Vec<f64>]) -> Vec<f64> {
    let steps = series.iter().map(Vec::len).max().unwrap_or(0);
    (0..steps)
        .map(|step| {
            let points: Vec<f64> = series.iter().filter_map(|s| s.get(step).copied()).collect();
            mean(&points)
        })
        .collect()
}

#[derive(Debug, Clone)]
struct CachedForecast {
    set: ForecastSet,
    updated_at: DateTime<Utc>,
}

pub struct ForecastClient {
    base_url: String,
    client: reqwest::Client,
    fetch_timeout: Duration,
    refresh_timeout: Duration,
    latest: RwLock<Option<CachedForecast>>,
}

impl ForecastClient {
    pub fn new(
        base_url: impl Into<String>,
        fetch_timeout: Duration,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            fetch_timeout,
            refresh_timeout,
            latest: RwLock::new(None),
        }
    }

    /// Read the forecaster's current predictions, falling back to the cache.
    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn fetch(&self) -> Result<ForecastSet> {
        let url = join_url(&self.base_url, "forecasts");
        let request = self.client.get(&url).timeout(self.fetch_timeout);

        match Self::read_set(request).await {
            Ok(set) => {
                self.store(set.clone()).await;
                debug!("fetched forecasts for {} nodes", set.nodes.len());
                Ok(set)
            }
            Err(e) => match self.cached().await {
                Some(cached) => {
                    warn!("forecaster unavailable, serving cached forecasts: {e:#}");
                    Ok(cached)
                }
                None => Err(e.context("no cached forecasts to fall back to")),
            },
        }
    }

    /// Ask the forecaster to recompute predictions over the full horizon.
    #[instrument(skip(self), fields(url = %self.base_url))]
    pub async fn refresh(&self) -> Result<ForecastSet> {
        let url = join_url(&self.base_url, "forecast");
        let request = self
            .client
            .post(&url)
            .timeout(self.refresh_timeout)
            .json(&json!({
                "steps": FORECAST_HORIZON,
                "models": FORECAST_MODELS,
            }));

        let set = Self::read_set(request)
            .await
            .context("forecast refresh failed")?;
        self.store(set.clone()).await;
        info!("refreshed forecasts for {} nodes", set.nodes.len());
        Ok(set)
    }

    async fn read_set(request: reqwest::RequestBuilder) -> Result<ForecastSet> {
        let response = request
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        response
            .json::<ForecastSet>()
            .await
            .context("failed to parse forecast JSON")
    }

    async fn store(&self, set: ForecastSet) {
        *self.latest.write().await = Some(CachedForecast {
            set,
            updated_at: Utc::now(),
        });
    }

    pub async fn cached(&self) -> Option<ForecastSet> {
        self.latest.read().await.as_ref().map(|c| c.set.clone())
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.latest.read().await.as_ref().map(|c| c.updated_at)
    }

    /// Per-metric statistics over the cached forecasts.
    ///
    /// Metrics without any predicted points are left out.
    pub async fn summarize(&self) -> BTreeMap<String, MetricSummary> {
        let Some(set) = self.cached().await else {
            return BTreeMap::new();
        };
        summarize_set(&set)
    }

    pub async fn is_healthy(&self) -> bool {
        self.is_healthy_at(Utc::now()).await
    }

    pub async fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
        let Some(updated_at) = self.last_update().await else {
            return false;
        };
        (now - updated_at)
            .to_std()
            .map_or(true, |age| age <= FRESHNESS_WINDOW)
    }

    /// Anomalies reported by the forecaster; empty when unavailable.
    pub async fn anomalies(&self) -> Vec<Value> {
        let url = join_url(&self.base_url, "anomalies");
        match self.read_json(&url).await {
            Ok(Value::Array(anomalies)) => anomalies,
            Ok(other) => {
                debug!("unexpected anomalies payload: {other}");
                vec![]
            }
            Err(e) => {
                debug!("anomalies unavailable: {e:#}");
                vec![]
            }
        }
    }

    /// Model accuracy report from the forecaster, if it has one.
    pub async fn model_performance(&self) -> Option<Value> {
        let url = join_url(&self.base_url, "model-performance");
        self.read_json(&url)
            .await
            .inspect_err(|e| debug!("model performance unavailable: {e:#}"))
            .ok()
    }

    async fn read_json(&self, url: &str) -> Result<Value> {
        self.client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .context("failed to send HTTP request")?
            .error_for_status()
            .context("forecaster returned an error")?
            .json()
            .await
            .context("failed to parse JSON")
    }
}

pub fn summarize_set(set: &ForecastSet) -> BTreeMap<String, MetricSummary> {
    let mut summaries = BTreeMap::new();

    for metric in TRACKED_METRICS {
        let series: Vec<Vec<f64>> = set
            .nodes
            .keys()
            .map(|node| set.predictions(node, metric))
            .filter(|s| !s.is_empty())
            .collect();

        let points: Vec<f64> = series.iter().flatten().copied().collect();
        if points.is_empty() {
            continue;
        }

        let summary = MetricSummary {
            mean: mean(&points),
            max: points.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: points.iter().copied().fold(f64::INFINITY, f64::min),
            trend: classify_trend(&stepwise_mean(&series)),
        };
        summaries.insert(metric.to_string(), summary);
    }

    summaries
}
