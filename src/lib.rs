pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod collector;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod forecast;
pub mod rules;
pub mod scaling;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One snapshot reported by an agent's `/metrics` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Missing on the wire means the agent sent a broken payload, which counts as down.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub node_id: String,
    pub cpu: CpuInformation,
    pub memory: MemoryInformation,
    #[serde(default)]
    pub network: NetworkInformation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInformation {
    pub usage_percent: f64,
    #[serde(default)]
    pub load_avg: Vec<f64>,
    #[serde(default)]
    pub cores: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub total: u64,
    #[serde(default)]
    pub available: u64,
    pub used: u64,
    pub used_percent: f64,
}

/// Network counters, as deltas since the agent's previous poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInformation {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// One entry per configured endpoint per collection pass.
///
/// `metrics` is `None` when this cycle's poll failed, so rules such as
/// `node_down` still see the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSample {
    pub node_id: String,
    pub endpoint: String,
    pub metrics: Option<NodeMetrics>,
}

impl NodeSample {
    pub fn new(node_id: impl Into<String>, metrics: Option<NodeMetrics>) -> Self {
        let node_id = node_id.into();
        Self {
            endpoint: node_id.clone(),
            node_id,
            metrics,
        }
    }
}
