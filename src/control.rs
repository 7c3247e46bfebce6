//! ControlPlane - Facade over the collector, alert engine, forecaster and scaler
//!
//! The dispatcher drives the `run_*_cycle` methods on its cadences; the API
//! layer calls the query and command methods. Both only ever see cloned
//! snapshots of the component stores.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::alerts::{Alert, AlertEngine, AlertId, Severity};
use crate::collector::{MetricCollector, NodeHealth};
use crate::config::Config;
use crate::error::{ControlError, ControlResult};
use crate::events::{EventKind, Publisher};
use crate::forecast::{ForecastClient, ForecastSet};
use crate::scaling::{ScaleDirection, ScalingAction, ScalingOrchestrator, SimulatedActuator};
use crate::{NetworkInformation, NodeMetrics};

/// Largest replica count accepted from a manual request
pub const MAX_REPLICAS: u32 = 100;

/// Manual scaling request as received from a client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRequest {
    pub node_id: String,
    pub action: String,
    pub replicas: u32,
}

impl ScaleRequest {
    /// Reject malformed requests before they reach the orchestrator.
    pub fn validate(&self) -> ControlResult<ScaleDirection> {
        if self.node_id.trim().is_empty() {
            return Err(ControlError::InvalidRequest("nodeId must not be empty".into()));
        }

        let direction = self
            .action
            .parse::<ScaleDirection>()
            .map_err(ControlError::InvalidRequest)?;

        if !(1..=MAX_REPLICAS).contains(&self.replicas) {
            return Err(ControlError::InvalidRequest(format!(
                "replicas must be between 1 and {MAX_REPLICAS}, got {}",
                self.replicas
            )));
        }

        Ok(direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub metric_collector: bool,
    pub forecast_client: bool,
    pub overall: OverallStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub service_health: ServiceHealth,
    pub node_health: Vec<NodeHealth>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot handed to every new subscriber
#[derive(Debug, Clone, Serialize)]
pub struct InitialData {
    pub metrics: Vec<NodeMetrics>,
    pub alerts: Vec<Alert>,
    pub forecasts: Option<ForecastSet>,
}

/// Fleet-wide view over the cached metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub nodes: usize,
    pub average_cpu: Option<f64>,
    pub average_memory: Option<f64>,
    pub total_network: NetworkInformation,
}

/// What a metrics cycle produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub nodes: usize,
    pub collected: usize,
    pub new_alerts: usize,
    pub scaling_actions: usize,
}

#[derive(Clone)]
pub struct ControlPlane {
    pub collector: Arc<MetricCollector>,
    pub alerts: Arc<AlertEngine>,
    pub forecasts: Arc<ForecastClient>,
    pub scaling: Arc<ScalingOrchestrator>,
    publisher: Arc<dyn Publisher>,
    auto_scale: bool,
}

impl ControlPlane {
    pub fn new(
        collector: Arc<MetricCollector>,
        alerts: Arc<AlertEngine>,
        forecasts: Arc<ForecastClient>,
        scaling: Arc<ScalingOrchestrator>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            collector,
            alerts,
            forecasts,
            scaling,
            publisher,
            auto_scale: false,
        }
    }

    /// Run the scaling rules as part of every metrics cycle.
    pub fn with_auto_scale(mut self, enabled: bool) -> Self {
        self.auto_scale = enabled;
        self
    }

    /// Wire up all components from configuration, using the simulated actuator.
    pub fn from_config(config: &Config, publisher: Arc<dyn Publisher>) -> Result<Self> {
        let timeouts = &config.timeouts;

        let collector = MetricCollector::new(
            config.agents.clone(),
            Duration::from_secs(timeouts.agent_secs),
        )?;
        let forecasts = ForecastClient::new(
            config.forecaster_url.clone(),
            Duration::from_secs(timeouts.forecast_secs),
            Duration::from_secs(timeouts.refresh_secs),
        );
        let scaling = ScalingOrchestrator::new(
            Arc::new(SimulatedActuator::new(config.actuator_delay())),
            Duration::from_secs(timeouts.actuator_secs),
        );

        Ok(Self::new(
            Arc::new(collector),
            Arc::new(AlertEngine::new()),
            Arc::new(forecasts),
            Arc::new(scaling),
            publisher,
        )
        .with_auto_scale(config.auto_scale))
    }

    fn publish<T: Serialize>(&self, event: EventKind, value: &T) {
        match serde_json::to_value(value) {
            Ok(payload) => self.publisher.publish(event, payload),
            Err(e) => error!("failed to serialize {event} payload: {e}"),
        }
    }

    /// Collect, evaluate alerts (and scaling rules if enabled), publish.
    #[instrument(skip(self))]
    pub async fn run_metrics_cycle(&self) -> CycleReport {
        let samples = self.collector.collect().await;

        let metrics: Vec<&NodeMetrics> = samples.iter().filter_map(|s| s.metrics.as_ref()).collect();
        self.publish(EventKind::MetricsUpdate, &metrics);

        let new_alerts = self.alerts.evaluate(&samples).await;
        if !new_alerts.is_empty() {
            self.publish(EventKind::NewAlerts, &new_alerts);
        }

        let mut report = CycleReport {
            nodes: samples.len(),
            collected: metrics.len(),
            new_alerts: new_alerts.len(),
            scaling_actions: 0,
        };

        if self.auto_scale {
            let actions = self.scaling.auto_scale(&samples).await;
            if !actions.is_empty() {
                self.publish(EventKind::ScalingUpdate, &actions);
            }
            report.scaling_actions = actions.len();
        }

        debug!("metrics cycle finished: {report:?}");
        report
    }

    /// Ask the forecaster to recompute and publish the result.
    #[instrument(skip(self))]
    pub async fn run_forecast_cycle(&self) -> Result<()> {
        let set = self.forecasts.refresh().await?;
        self.publish(EventKind::ForecastUpdate, &set);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_health_cycle(&self) -> SystemHealth {
        let health = self.check_system_health().await;
        self.publish(EventKind::HealthUpdate, &health);
        health
    }

    pub async fn all_metrics(&self) -> Vec<NodeMetrics> {
        self.collector.cached().await
    }

    pub async fn cluster_summary(&self) -> ClusterSummary {
        ClusterSummary {
            nodes: self.collector.cached().await.len(),
            average_cpu: self.collector.average_cpu().await,
            average_memory: self.collector.average_memory().await,
            total_network: self.collector.total_network().await,
        }
    }

    pub async fn node_status(&self) -> Vec<NodeHealth> {
        self.collector.health().await
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active().await
    }

    /// Active alerts, optionally narrowed to one severity and/or one node.
    pub async fn filtered_alerts(
        &self,
        severity: Option<Severity>,
        node_id: Option<&str>,
    ) -> Vec<Alert> {
        match (severity, node_id) {
            (None, None) => self.alerts.active().await,
            (Some(severity), None) => self.alerts.by_severity(severity).await,
            (None, Some(node_id)) => self.alerts.by_node(node_id).await,
            (Some(severity), Some(node_id)) => self
                .alerts
                .by_node(node_id)
                .await
                .into_iter()
                .filter(|alert| alert.severity == severity)
                .collect(),
        }
    }

    /// Acknowledge by rendered id. Unknown or malformed ids return `false`.
    pub async fn acknowledge_alert(&self, id: &str) -> bool {
        let Ok(alert_id) = id.parse::<AlertId>() else {
            debug!("ignoring acknowledgement of malformed alert id {id}");
            return false;
        };

        if !self.alerts.acknowledge(&alert_id).await {
            return false;
        }

        if let Some(alert) = self.alerts.get(&alert_id).await {
            self.publish(EventKind::AlertAcknowledged, &alert);
        }
        true
    }

    pub async fn resolve_alert(&self, id: &str) -> bool {
        match id.parse::<AlertId>() {
            Ok(alert_id) => self.alerts.resolve(&alert_id).await,
            Err(_) => false,
        }
    }

    /// Latest forecasts, served from cache when the forecaster is down.
    pub async fn forecasts(&self) -> ControlResult<ForecastSet> {
        self.forecasts.fetch().await.map_err(|e| {
            error!("failed to get forecasts: {e:#}");
            ControlError::Upstream(e)
        })
    }

    pub async fn scale_node(
        &self,
        node_id: &str,
        action: &str,
        replicas: u32,
    ) -> ControlResult<ScalingAction> {
        self.scale(ScaleRequest {
            node_id: node_id.to_string(),
            action: action.to_string(),
            replicas,
        })
        .await
    }

    pub async fn scale(&self, request: ScaleRequest) -> ControlResult<ScalingAction> {
        let direction = request.validate()?;
        info!(
            "manual {direction} of {} to {} replicas requested",
            request.node_id, request.replicas
        );
        Ok(self
            .scaling
            .scale(&request.node_id, direction, request.replicas)
            .await)
    }

    pub async fn scaling_action(&self, id: &str) -> ControlResult<ScalingAction> {
        self.scaling
            .get(id)
            .await
            .ok_or_else(|| ControlError::NotFound(format!("scaling action {id}")))
    }

    pub async fn check_system_health(&self) -> SystemHealth {
        let metric_collector = self.collector.is_operational().await;
        let forecast_client = self.forecasts.is_healthy().await;

        let overall = match (metric_collector, forecast_client) {
            (true, true) => OverallStatus::Healthy,
            (false, false) => OverallStatus::Unhealthy,
            _ => OverallStatus::Degraded,
        };

        SystemHealth {
            service_health: ServiceHealth {
                metric_collector,
                forecast_client,
                overall,
            },
            node_health: self.collector.health().await,
            timestamp: Utc::now(),
        }
    }

    pub async fn initial_data(&self) -> InitialData {
        InitialData {
            metrics: self.collector.cached().await,
            alerts: self.alerts.active().await,
            forecasts: self.forecasts.cached().await,
        }
    }
}
