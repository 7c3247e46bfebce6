//! Events pushed to live subscribers
//!
//! Components never talk to the push transport directly. They publish through
//! the [`Publisher`] capability; [`BroadcastPublisher`] fans events out over a
//! Tokio broadcast channel, which the WebSocket stream subscribes to.
//!
//! The channel may lag or drop events for slow subscribers. That is acceptable
//! because every event is superseded by the next cycle's.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    MetricsUpdate,
    NewAlerts,
    AlertAcknowledged,
    ForecastUpdate,
    HealthUpdate,
    ScalingUpdate,
    /// Snapshot delivered once to each new subscriber
    InitialData,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MetricsUpdate => "metricsUpdate",
            EventKind::NewAlerts => "newAlerts",
            EventKind::AlertAcknowledged => "alertAcknowledged",
            EventKind::ForecastUpdate => "forecastUpdate",
            EventKind::HealthUpdate => "healthUpdate",
            EventKind::ScalingUpdate => "scalingUpdate",
            EventKind::InitialData => "initialData",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HubEvent {
    pub event: EventKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl HubEvent {
    pub fn new(event: EventKind, payload: Value) -> Self {
        Self {
            event,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Capability to push a named event to whoever is listening
pub trait Publisher: Send + Sync {
    fn publish(&self, event: EventKind, payload: Value);
}

#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<HubEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, event: EventKind, payload: Value) {
        // No subscribers is fine; the event is simply dropped.
        match self.tx.send(HubEvent::new(event, payload)) {
            Ok(receivers) => trace!("published {event} to {receivers} receivers"),
            Err(_) => trace!("no receivers for {event}"),
        }
    }
}
