//! AlertEngine - Evaluates alert rules and tracks the alert lifecycle
//!
//! ## Lifecycle
//!
//! ```text
//! rule matches → open ──acknowledge──▶ acknowledged ──resolve──▶ resolved
//!                  └──────────────────resolve─────────────────────▶
//! ```
//!
//! Alerts are never removed. An alert's identity embeds the millisecond it was
//! raised, so a condition that keeps matching raises a fresh alert every
//! evaluation; only repeats within the same millisecond collapse into one.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, trace};

use crate::rules::{Condition, MetricKind};
use crate::{NodeMetrics, NodeSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Composite alert identity: `(rule, node, creation millis)`
///
/// Rendered as `rule:node:millis`. Node identifiers derived from endpoints
/// never contain `:`, so parsing splits from the right and rule ids may.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertId {
    pub rule_id: String,
    pub node_id: String,
    pub created_ms: i64,
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.rule_id, self.node_id, self.created_ms)
    }
}

impl FromStr for AlertId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, millis) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("malformed alert id '{s}'"))?;
        let (rule_id, node_id) = rest
            .rsplit_once(':')
            .ok_or_else(|| format!("malformed alert id '{s}'"))?;
        let created_ms = millis
            .parse()
            .map_err(|_| format!("malformed alert timestamp in '{s}'"))?;

        Ok(AlertId {
            rule_id: rule_id.to_string(),
            node_id: node_id.to_string(),
            created_ms,
        })
    }
}

impl Serialize for AlertId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub rule_id: String,
    pub rule_name: String,
    pub node_id: String,
    pub severity: Severity,
    pub message: String,
    /// Snapshot that triggered the alert (absent for `node_down`)
    pub metrics: Option<NodeMetrics>,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub condition: Condition,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        condition: Condition,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            severity,
            condition,
        }
    }
}

pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "cpu_high",
            "High CPU Usage",
            Severity::Warning,
            Condition::above(MetricKind::CpuUsage, 80.0),
        ),
        AlertRule::new(
            "cpu_critical",
            "Critical CPU Usage",
            Severity::Critical,
            Condition::above(MetricKind::CpuUsage, 95.0),
        ),
        AlertRule::new(
            "memory_high",
            "High Memory Usage",
            Severity::Warning,
            Condition::above(MetricKind::MemoryUsed, 85.0),
        ),
        AlertRule::new(
            "memory_critical",
            "Critical Memory Usage",
            Severity::Critical,
            Condition::above(MetricKind::MemoryUsed, 95.0),
        ),
        AlertRule::new("node_down", "Node Down", Severity::Critical, Condition::NodeDown),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Append-only alert log with a position index
#[derive(Default)]
struct AlertLog {
    entries: Vec<Alert>,
    index: HashMap<AlertId, usize>,
}

impl AlertLog {
    fn get_mut(&mut self, id: &AlertId) -> Option<&mut Alert> {
        let position = *self.index.get(id)?;
        self.entries.get_mut(position)
    }

    /// Entries matching `filter`, newest first. Ties keep the later insertion first.
    fn newest_first(&self, filter: impl Fn(&Alert) -> bool) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .entries
            .iter()
            .rev()
            .filter(|a| filter(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }
}

pub struct AlertEngine {
    rules: RwLock<Vec<AlertRule>>,
    alerts: RwLock<AlertLog>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEngine {
    /// Create an engine with the built-in rule set
    pub fn new() -> Self {
        Self::with_rules(default_alert_rules())
    }

    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            alerts: RwLock::new(AlertLog::default()),
        }
    }

    /// Evaluate every rule against every sample and return only new alerts.
    pub async fn evaluate(&self, samples: &[NodeSample]) -> Vec<Alert> {
        self.evaluate_at(samples, Utc::now()).await
    }

    /// Same as [`AlertEngine::evaluate`] with an explicit evaluation instant.
    #[instrument(skip(self, samples), fields(nodes = samples.len()))]
    pub async fn evaluate_at(&self, samples: &[NodeSample], now: DateTime<Utc>) -> Vec<Alert> {
        let rules = self.rules.read().await.clone();
        let created_ms = now.timestamp_millis();

        let mut log = self.alerts.write().await;
        let mut fresh = vec![];

        for sample in samples {
            let metrics = sample.metrics.as_ref();

            for rule in &rules {
                if !rule.condition.evaluate(metrics) {
                    continue;
                }

                let id = AlertId {
                    rule_id: rule.id.clone(),
                    node_id: sample.node_id.clone(),
                    created_ms,
                };

                if log.index.contains_key(&id) {
                    trace!("alert {id} already raised");
                    continue;
                }

                let alert = Alert {
                    id: id.clone(),
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    node_id: sample.node_id.clone(),
                    severity: rule.severity,
                    message: rule.condition.describe(&sample.node_id, metrics),
                    metrics: metrics.cloned(),
                    created_at: now,
                    acknowledged: false,
                    acknowledged_at: None,
                    resolved: false,
                    resolved_at: None,
                };

                debug!("raised {} alert {id}: {}", alert.severity, alert.message);

                let position = log.entries.len();
                log.index.insert(id, position);
                log.entries.push(alert.clone());
                fresh.push(alert);
            }
        }

        if !fresh.is_empty() {
            info!("raised {} new alerts", fresh.len());
        }

        fresh
    }

    /// Mark an alert acknowledged. Repeated calls re-stamp the time.
    pub async fn acknowledge(&self, id: &AlertId) -> bool {
        let mut log = self.alerts.write().await;
        let Some(alert) = log.get_mut(id) else {
            return false;
        };

        alert.acknowledged = true;
        alert.acknowledged_at = Some(Utc::now());
        debug!("acknowledged alert {id}");
        true
    }

    /// Mark an alert resolved. Repeated calls re-stamp the time.
    pub async fn resolve(&self, id: &AlertId) -> bool {
        let mut log = self.alerts.write().await;
        let Some(alert) = log.get_mut(id) else {
            return false;
        };

        alert.resolved = true;
        alert.resolved_at = Some(Utc::now());
        debug!("resolved alert {id}");
        true
    }

    pub async fn get(&self, id: &AlertId) -> Option<Alert> {
        let log = self.alerts.read().await;
        log.index.get(id).map(|&position| log.entries[position].clone())
    }

    /// Unresolved alerts, newest first
    pub async fn active(&self) -> Vec<Alert> {
        self.alerts.read().await.newest_first(|a| !a.resolved)
    }

    pub async fn by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .newest_first(|a| !a.resolved && a.severity == severity)
    }

    pub async fn by_node(&self, node_id: &str) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .newest_first(|a| !a.resolved && a.node_id == node_id)
    }

    pub async fn add_rule(&self, rule: AlertRule) {
        debug!("adding alert rule {}", rule.id);
        self.rules.write().await.push(rule);
    }

    /// Remove every rule with the given id. Returns whether anything was removed.
    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        before != rules.len()
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().await.clone()
    }

    pub async fn stats(&self) -> AlertStats {
        let log = self.alerts.read().await;

        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for alert in &log.entries {
            *by_severity.entry(alert.severity).or_default() += 1;
        }

        AlertStats {
            total: log.entries.len(),
            active: log.entries.iter().filter(|a| !a.resolved).count(),
            acknowledged: log.entries.iter().filter(|a| a.acknowledged).count(),
            resolved: log.entries.iter().filter(|a| a.resolved).count(),
            by_severity,
        }
    }
}
