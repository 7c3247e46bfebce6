//! API shared state

use crate::control::ControlPlane;
use crate::events::BroadcastPublisher;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Facade over all control plane components
    pub control: ControlPlane,

    /// Event fan-out, subscribed to by WebSocket clients
    pub events: BroadcastPublisher,
}

impl ApiState {
    pub fn new(control: ControlPlane, events: BroadcastPublisher) -> Self {
        Self { control, events }
    }
}
