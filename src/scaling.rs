//! ScalingOrchestrator - Decides scaling intent and records its outcome
//!
//! The orchestrator never touches infrastructure itself. Every request is
//! handed to an [`Actuator`], and the answer (or the lack of one within the
//! timeout) settles the recorded action as `completed` or `failed`.
//!
//! ```text
//! scale() → push pending → spawn(actuator (timeout) → completed | failed) → return record
//! ```
//!
//! The actuator call runs in its own task, so a caller that gives up waiting
//! never leaves a record `pending`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::NodeSample;
use crate::rules::{Condition, MetricKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    ScaleUp,
    ScaleDown,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::ScaleUp => "scale_up",
            ScaleDirection::ScaleDown => "scale_down",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale_up" => Ok(ScaleDirection::ScaleUp),
            "scale_down" => Ok(ScaleDirection::ScaleDown),
            other => Err(format!(
                "unknown scaling action '{other}' (expected scale_up or scale_down)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingStatus {
    Pending,
    Completed,
    Failed,
}

/// What caused a scaling request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScalingTrigger {
    Manual,
    Rule { rule_id: String },
}

/// Answer from the actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorOutcome {
    pub success: bool,
    pub message: String,
    pub replicas: u32,
    pub timestamp: DateTime<Utc>,
}

/// External system that actually changes replica counts
///
/// Implementations must be `Send + Sync` as the orchestrator is shared
/// across the scheduler and API tasks.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Apply the requested change.
    ///
    /// `Err` means the actuator could not be reached; a reachable actuator
    /// that refuses the change answers with `success: false`.
    async fn execute_scaling(
        &self,
        node_id: &str,
        action: ScaleDirection,
        replicas: u32,
    ) -> Result<ActuatorOutcome>;
}

/// Stand-in actuator that succeeds after a fixed delay
pub struct SimulatedActuator {
    delay: Duration,
}

impl SimulatedActuator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    async fn execute_scaling(
        &self,
        node_id: &str,
        action: ScaleDirection,
        replicas: u32,
    ) -> Result<ActuatorOutcome> {
        tokio::time::sleep(self.delay).await;
        debug!("simulated {action} of {node_id} to {replicas} replicas");

        Ok(ActuatorOutcome {
            success: true,
            message: format!("Successfully executed {action} for {node_id}"),
            replicas,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingAction {
    /// `node:millis-sequence` of the request, unique per orchestrator
    pub id: String,
    pub node_id: String,
    pub action: ScaleDirection,
    pub replicas: u32,
    pub status: ScalingStatus,
    pub trigger: ScalingTrigger,
    pub result: Option<ActuatorOutcome>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScalingRule {
    pub id: String,
    pub name: String,
    pub condition: Condition,
    pub action: ScaleDirection,
    pub replicas: u32,
}

impl ScalingRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: Condition,
        action: ScaleDirection,
        replicas: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition,
            action,
            replicas,
        }
    }
}

pub fn default_scaling_rules() -> Vec<ScalingRule> {
    vec![
        ScalingRule::new(
            "cpu_scale_up",
            "Scale up on high CPU",
            Condition::above(MetricKind::CpuUsage, 80.0),
            ScaleDirection::ScaleUp,
            2,
        ),
        ScalingRule::new(
            "cpu_scale_down",
            "Scale down on low CPU",
            Condition::below(MetricKind::CpuUsage, 20.0),
            ScaleDirection::ScaleDown,
            1,
        ),
        ScalingRule::new(
            "memory_scale_up",
            "Scale up on high memory",
            Condition::above(MetricKind::MemoryUsed, 85.0),
            ScaleDirection::ScaleUp,
            2,
        ),
    ]
}

/// A rule whose condition held for a node
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredRule {
    pub rule_id: String,
    pub rule_name: String,
    pub node_id: String,
    pub action: ScaleDirection,
    pub replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    /// Completed actions as a percentage of all recorded actions
    pub success_rate: f64,
}

pub struct ScalingOrchestrator {
    actuator: Arc<dyn Actuator>,
    timeout: Duration,
    rules: RwLock<Vec<ScalingRule>>,
    history: Arc<RwLock<Vec<ScalingAction>>>,
    sequence: AtomicU64,
}

impl ScalingOrchestrator {
    /// Create an orchestrator with the built-in rule set
    pub fn new(actuator: Arc<dyn Actuator>, timeout: Duration) -> Self {
        Self::with_rules(actuator, timeout, default_scaling_rules())
    }

    pub fn with_rules(
        actuator: Arc<dyn Actuator>,
        timeout: Duration,
        rules: Vec<ScalingRule>,
    ) -> Self {
        Self {
            actuator,
            timeout,
            rules: RwLock::new(rules),
            history: Arc::new(RwLock::new(vec![])),
            sequence: AtomicU64::new(0),
        }
    }

    /// Request a manual scaling change and wait for its outcome.
    pub async fn scale(&self, node_id: &str, action: ScaleDirection, replicas: u32) -> ScalingAction {
        self.execute(node_id, action, replicas, ScalingTrigger::Manual)
            .await
    }

    #[instrument(skip(self, trigger))]
    async fn execute(
        &self,
        node_id: &str,
        action: ScaleDirection,
        replicas: u32,
        trigger: ScalingTrigger,
    ) -> ScalingAction {
        let requested_at = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let pending = ScalingAction {
            id: format!("{node_id}:{}-{sequence}", requested_at.timestamp_millis()),
            node_id: node_id.to_string(),
            action,
            replicas,
            status: ScalingStatus::Pending,
            trigger,
            result: None,
            requested_at,
            completed_at: None,
        };

        let position = {
            let mut history = self.history.write().await;
            history.push(pending);
            history.len() - 1
        };

        // Settles the record even if the caller stops waiting
        let settle = tokio::spawn(settle_action(
            self.actuator.clone(),
            self.history.clone(),
            self.timeout,
            position,
            node_id.to_string(),
            action,
            replicas,
        ));

        match settle.await {
            Ok(settled) => settled,
            Err(e) => {
                error!("scaling task for {node_id} did not finish: {e}");
                self.history.read().await[position].clone()
            }
        }
    }

    /// Every (rule, node) pair whose condition holds for this batch.
    pub async fn evaluate_rules(&self, samples: &[NodeSample]) -> Vec<TriggeredRule> {
        let rules = self.rules.read().await.clone();

        samples
            .iter()
            .flat_map(|sample| {
                rules
                    .iter()
                    .filter(|rule| rule.condition.evaluate(sample.metrics.as_ref()))
                    .map(|rule| TriggeredRule {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        node_id: sample.node_id.clone(),
                        action: rule.action,
                        replicas: rule.replicas,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Evaluate the rules and act on every match.
    ///
    /// Actions run concurrently; a failing action is recorded as `failed`
    /// without affecting the others.
    pub async fn auto_scale(&self, samples: &[NodeSample]) -> Vec<ScalingAction> {
        let triggered = self.evaluate_rules(samples).await;
        if triggered.is_empty() {
            return vec![];
        }

        debug!("{} scaling rules triggered", triggered.len());

        let actions = triggered.into_iter().map(|t| async move {
            self.execute(
                &t.node_id,
                t.action,
                t.replicas,
                ScalingTrigger::Rule { rule_id: t.rule_id },
            )
            .await
        });

        join_all(actions).await
    }

    /// The most recent `limit` actions, newest first.
    pub async fn history(&self, limit: usize) -> Vec<ScalingAction> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Latest action recorded under `id`.
    pub async fn get(&self, id: &str) -> Option<ScalingAction> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn add_rule(&self, rule: ScalingRule) {
        debug!("adding scaling rule {}", rule.id);
        self.rules.write().await.push(rule);
    }

    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        before != rules.len()
    }

    pub async fn rules(&self) -> Vec<ScalingRule> {
        self.rules.read().await.clone()
    }

    pub async fn stats(&self) -> ScalingStats {
        let history = self.history.read().await;
        let count = |status: ScalingStatus| history.iter().filter(|a| a.status == status).count();

        let total = history.len();
        let completed = count(ScalingStatus::Completed);
        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        ScalingStats {
            total,
            completed,
            failed: count(ScalingStatus::Failed),
            pending: count(ScalingStatus::Pending),
            success_rate,
        }
    }
}

/// Call the actuator and move the entry at `position` out of `pending`.
async fn settle_action(
    actuator: Arc<dyn Actuator>,
    history: Arc<RwLock<Vec<ScalingAction>>>,
    timeout: Duration,
    position: usize,
    node_id: String,
    action: ScaleDirection,
    replicas: u32,
) -> ScalingAction {
    let outcome = match tokio::time::timeout(
        timeout,
        actuator.execute_scaling(&node_id, action, replicas),
    )
    .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!("actuator failed for {node_id}: {e:#}");
            failed_outcome(format!("{e:#}"), replicas)
        }
        Err(_) => {
            warn!("actuator timed out for {node_id} after {timeout:?}");
            failed_outcome(format!("actuator timed out after {timeout:?}"), replicas)
        }
    };

    let status = if outcome.success {
        ScalingStatus::Completed
    } else {
        ScalingStatus::Failed
    };
    info!("{action} of {node_id} to {replicas} replicas: {status:?}");

    let mut history = history.write().await;
    let entry = &mut history[position];
    entry.status = status;
    entry.result = Some(outcome);
    entry.completed_at = Some(Utc::now());
    entry.clone()
}

fn failed_outcome(message: String, replicas: u32) -> ActuatorOutcome {
    ActuatorOutcome {
        success: false,
        message,
        replicas,
        timestamp: Utc::now(),
    }
}
