//! MetricCollector - Polls agent endpoints for metrics
//!
//! Every configured agent is polled concurrently on each pass, so the pass
//! takes as long as the slowest request (bounded by the client timeout) rather
//! than the sum of all requests.
//!
//! ## Stores
//!
//! - **cache**: latest successful snapshot per endpoint. A failed poll leaves the
//!   previous entry in place.
//! - **health**: per-endpoint status, flipped on every poll outcome without
//!   smoothing.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

use crate::util::{join_url, node_id_from_endpoint};
use crate::{NetworkInformation, NodeMetrics, NodeSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Unhealthy,
}

/// Derived per-endpoint health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeHealth {
    pub endpoint: String,
    pub node_id: String,
    pub status: NodeStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl NodeHealth {
    fn unpolled(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            node_id: node_id_from_endpoint(endpoint),
            status: NodeStatus::Unhealthy,
            last_seen: None,
            last_error: None,
        }
    }
}

pub struct MetricCollector {
    /// Agent base URLs, in configuration order
    endpoints: Vec<String>,

    /// HTTP client (reused across requests, carries the per-request timeout)
    client: reqwest::Client,

    cache: RwLock<HashMap<String, NodeMetrics>>,

    health: RwLock<HashMap<String, NodeHealth>>,
}

impl MetricCollector {
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        let health = endpoints
            .iter()
            .map(|endpoint| (endpoint.clone(), NodeHealth::unpolled(endpoint)))
            .collect();

        Ok(Self {
            endpoints,
            client,
            cache: RwLock::new(HashMap::new()),
            health: RwLock::new(health),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Poll every agent once.
    ///
    /// Returns one sample per configured endpoint, in configuration order.
    /// Endpoints that failed this pass yield a sample without metrics.
    #[instrument(skip(self), fields(endpoints = self.endpoints.len()))]
    pub async fn collect(&self) -> Vec<NodeSample> {
        let polls = self.endpoints.iter().map(|endpoint| self.collect_one(endpoint));
        let samples = join_all(polls).await;

        let collected = samples.iter().filter(|s| s.metrics.is_some()).count();
        debug!("collected metrics from {collected}/{} agents", samples.len());

        samples
    }

    async fn collect_one(&self, endpoint: &str) -> NodeSample {
        let node_id = node_id_from_endpoint(endpoint);

        match self.fetch_metrics(endpoint).await {
            Ok(metrics) => {
                let now = Utc::now();
                self.cache
                    .write()
                    .await
                    .insert(endpoint.to_string(), metrics.clone());

                let mut health = self.health.write().await;
                let entry = health
                    .entry(endpoint.to_string())
                    .or_insert_with(|| NodeHealth::unpolled(endpoint));
                entry.status = NodeStatus::Healthy;
                entry.last_seen = Some(now);
                entry.last_error = None;

                NodeSample {
                    node_id,
                    endpoint: endpoint.to_string(),
                    metrics: Some(metrics),
                }
            }
            Err(e) => {
                warn!("{endpoint}: failed to collect metrics: {e:#}");

                let mut health = self.health.write().await;
                let entry = health
                    .entry(endpoint.to_string())
                    .or_insert_with(|| NodeHealth::unpolled(endpoint));
                entry.status = NodeStatus::Unhealthy;
                entry.last_error = Some(format!("{e:#}"));

                NodeSample {
                    node_id,
                    endpoint: endpoint.to_string(),
                    metrics: None,
                }
            }
        }
    }

    async fn fetch_metrics(&self, endpoint: &str) -> Result<NodeMetrics> {
        let url = join_url(endpoint, "metrics");
        trace!("requesting metrics from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        serde_json::from_str(&body).context("failed to parse metrics JSON")
    }

    /// Read an agent's `/health` liveness document.
    pub async fn probe(&self, endpoint: &str) -> Result<serde_json::Value> {
        let url = join_url(endpoint, "health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to send HTTP request")?
            .error_for_status()
            .context("agent reported unhealthy")?;

        response
            .json()
            .await
            .context("failed to parse health JSON")
    }

    /// Latest snapshot per endpoint, without touching the network.
    pub async fn cached(&self) -> Vec<NodeMetrics> {
        let cache = self.cache.read().await;
        self.endpoints
            .iter()
            .filter_map(|endpoint| cache.get(endpoint).cloned())
            .collect()
    }

    pub async fn health(&self) -> Vec<NodeHealth> {
        let health = self.health.read().await;
        self.endpoints
            .iter()
            .map(|endpoint| {
                health
                    .get(endpoint)
                    .cloned()
                    .unwrap_or_else(|| NodeHealth::unpolled(endpoint))
            })
            .collect()
    }

    /// True iff at least one agent answered its most recent poll.
    pub async fn is_operational(&self) -> bool {
        self.health
            .read()
            .await
            .values()
            .any(|h| h.status == NodeStatus::Healthy)
    }

    pub async fn average_cpu(&self) -> Option<f64> {
        let cache = self.cache.read().await;
        average(cache.values().map(|m| m.cpu.usage_percent))
    }

    pub async fn average_memory(&self) -> Option<f64> {
        let cache = self.cache.read().await;
        average(cache.values().map(|m| m.memory.used_percent))
    }

    /// Counters saturate: agents report unsigned deltas, which wrap to huge values on a counter reset.
    pub async fn total_network(&self) -> NetworkInformation {
        let cache = self.cache.read().await;
        cache
            .values()
            .fold(NetworkInformation::default(), |mut acc, m| {
                acc.bytes_sent = acc.bytes_sent.saturating_add(m.network.bytes_sent);
                acc.bytes_recv = acc.bytes_recv.saturating_add(m.network.bytes_recv);
                acc.packets_sent = acc.packets_sent.saturating_add(m.network.packets_sent);
                acc.packets_recv = acc.packets_recv.saturating_add(m.network.packets_recv);
                acc
            })
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
