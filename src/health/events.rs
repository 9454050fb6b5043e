//! Health transition events and their observers.

use serde::Serialize;
use tokio::sync::mpsc;

/// Direction of a health transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Unhealthy → Healthy.
    Recovered,
    /// Unknown/Healthy → Unhealthy.
    Down,
}

/// What observed the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Probe,
    Traffic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthEvent {
    pub instance_id: String,
    pub category: String,
    pub transition: Transition,
    pub source: EventSource,
    /// Unix millis.
    pub at: u64,
    pub reason: Option<String>,
}

/// Receives health transitions as they happen.
///
/// Called synchronously from the prober after the record lock is released;
/// implementations must not block.
pub trait HealthObserver: Send + Sync {
    fn on_health_event(&self, event: &HealthEvent);
}

impl HealthObserver for mpsc::UnboundedSender<HealthEvent> {
    fn on_health_event(&self, event: &HealthEvent) {
        let _ = self.send(event.clone());
    }
}
