//! Conditions shared by alert and scaling rules
//!
//! A condition looks at one node's metrics for the current cycle. The metrics
//! are `None` when the node did not answer, which only [`Condition::NodeDown`]
//! treats as a match.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::NodeMetrics;

/// Metric a threshold condition reads from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuUsage,
    MemoryUsed,
}

impl MetricKind {
    pub fn read(&self, metrics: &NodeMetrics) -> f64 {
        match self {
            MetricKind::CpuUsage => metrics.cpu.usage_percent,
            MetricKind::MemoryUsed => metrics.memory.used_percent,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::CpuUsage => "CPU usage",
            MetricKind::MemoryUsed => "Memory usage",
        }
    }
}

pub type ConditionFn = Arc<dyn Fn(Option<&NodeMetrics>) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Condition {
    /// Strictly greater than the threshold
    Above { metric: MetricKind, threshold: f64 },

    /// Strictly less than the threshold
    Below { metric: MetricKind, threshold: f64 },

    /// No snapshot this cycle, or a snapshot without a timestamp
    NodeDown,

    /// Caller-provided predicate, e.g. for rules added at runtime
    Custom(ConditionFn),
}

impl Condition {
    pub fn above(metric: MetricKind, threshold: f64) -> Self {
        Condition::Above { metric, threshold }
    }

    pub fn below(metric: MetricKind, threshold: f64) -> Self {
        Condition::Below { metric, threshold }
    }

    pub fn custom(f: impl Fn(Option<&NodeMetrics>) -> bool + Send + Sync + 'static) -> Self {
        Condition::Custom(Arc::new(f))
    }

    pub fn evaluate(&self, metrics: Option<&NodeMetrics>) -> bool {
        match self {
            Condition::Above { metric, threshold } => {
                metrics.is_some_and(|m| metric.read(m) > *threshold)
            }
            Condition::Below { metric, threshold } => {
                metrics.is_some_and(|m| metric.read(m) < *threshold)
            }
            Condition::NodeDown => metrics.is_none_or(|m| m.timestamp.is_none()),
            Condition::Custom(f) => f(metrics),
        }
    }

    /// Human readable explanation of why the condition matched.
    pub fn describe(&self, node_id: &str, metrics: Option<&NodeMetrics>) -> String {
        match (self, metrics) {
            (Condition::Above { metric, threshold }, Some(m)) => format!(
                "{} on {node_id} is {:.1}% (above {threshold}%)",
                metric.label(),
                metric.read(m)
            ),
            (Condition::Below { metric, threshold }, Some(m)) => format!(
                "{} on {node_id} is {:.1}% (below {threshold}%)",
                metric.label(),
                metric.read(m)
            ),
            (Condition::NodeDown, _) | (_, None) => format!("Node {node_id} is not reporting metrics"),
            (Condition::Custom(_), Some(_)) => format!("Custom condition matched on {node_id}"),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Above { metric, threshold } => {
                write!(f, "Above({metric:?} > {threshold})")
            }
            Condition::Below { metric, threshold } => {
                write!(f, "Below({metric:?} < {threshold})")
            }
            Condition::NodeDown => f.write_str("NodeDown"),
            Condition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        match self {
            Condition::Above { metric, threshold } | Condition::Below { metric, threshold } => {
                let kind = if matches!(self, Condition::Above { .. }) {
                    "above"
                } else {
                    "below"
                };
                let mut s = serializer.serialize_struct("Condition", 3)?;
                s.serialize_field("kind", kind)?;
                s.serialize_field("metric", metric)?;
                s.serialize_field("threshold", threshold)?;
                s.end()
            }
            Condition::NodeDown => {
                let mut s = serializer.serialize_struct("Condition", 1)?;
                s.serialize_field("kind", "node_down")?;
                s.end()
            }
            Condition::Custom(_) => {
                let mut s = serializer.serialize_struct("Condition", 1)?;
                s.serialize_field("kind", "custom")?;
                s.end()
            }
        }
    }
}
