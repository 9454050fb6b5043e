//! Passive health checking (failure detection from live traffic).
//!
//! # Responsibilities
//! - Observe forwarding failures
//! - Mark the instance unhealthy immediately, without waiting for a probe
//!
//! # Design Decisions
//! - Connection errors, timeouts and 5xx count as failures
//! - 4xx are NOT failures (client error, not instance)
//! - Probe statistics are left alone; only the status flips
//! - Recovery is always probe-driven, so with probing disabled the status is
//!   left alone and only the circuit breaker reacts

use crate::clock::unix_millis;
use crate::health::active::HealthProber;
use crate::health::events::{EventSource, HealthEvent, Transition};
use crate::observability::metrics;
use crate::registry::{HealthState, Instance};

impl HealthProber {
    /// Mark `instance` unhealthy after a failed forward.
    pub fn report_traffic_failure(&self, instance: &Instance, cause: &str) -> Option<HealthEvent> {
        if !self.probing_enabled() || !self.registry.is_current(instance) {
            return None;
        }
        let event = {
            let mut record = self.records.entry(instance.id.clone()).or_default();
            record.mark_unhealthy(cause.to_string());
            let previous = instance.set_health(HealthState::Unhealthy);
            (previous != HealthState::Unhealthy).then(|| HealthEvent {
                instance_id: instance.id.clone(),
                category: instance.category.clone(),
                transition: Transition::Down,
                source: EventSource::Traffic,
                at: unix_millis(),
                reason: Some(cause.to_string()),
            })
        };

        metrics::record_instance_health(&instance.id, false);
        if let Some(event) = &event {
            self.notify(event);
        }
        event
    }
}
