//! Per-instance health record.
//!
//! # State Transitions
//! ```text
//! Unknown/Healthy → Unhealthy: any failed probe (or forwarding failure)  → Down
//! Unhealthy → Healthy:         one successful probe                      → Recovered
//! Unknown → Healthy:           first successful probe (no event)
//! ```
//!
//! # Design Decisions
//! - Record is owned by the prober, keyed by instance id
//! - The instance's atomic health flag is written under the same entry lock,
//!   so the record and the selector's view never disagree for long

use std::time::Duration;

use serde::Serialize;

use crate::registry::HealthState;

/// Probe statistics for one instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthRecord {
    pub status: HealthState,
    /// Unix millis of the last completed probe.
    pub last_checked_at: Option<u64>,
    pub last_latency_ms: Option<f64>,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub successful_checks: u64,
    /// Fraction of probes that succeeded, recomputed on every probe.
    pub success_rate: f64,
    pub last_error: Option<String>,
}

impl HealthRecord {
    pub(crate) fn record_success(&mut self, latency: Duration, now: u64) {
        self.status = HealthState::Healthy;
        self.last_checked_at = Some(now);
        self.last_latency_ms = Some(latency.as_secs_f64() * 1000.0);
        self.consecutive_failures = 0;
        self.total_checks += 1;
        self.successful_checks += 1;
        self.last_error = None;
        self.recompute_rate();
    }

    pub(crate) fn record_failure(&mut self, error: String, now: u64) {
        self.status = HealthState::Unhealthy;
        self.last_checked_at = Some(now);
        self.consecutive_failures += 1;
        self.total_checks += 1;
        self.last_error = Some(error);
        self.recompute_rate();
    }

    /// Traffic-observed failure: status only, probe statistics untouched.
    pub(crate) fn mark_unhealthy(&mut self, error: String) {
        self.status = HealthState::Unhealthy;
        self.last_error = Some(error);
    }

    fn recompute_rate(&mut self) {
        self.success_rate = if self.total_checks == 0 {
            0.0
        } else {
            self.successful_checks as f64 / self.total_checks as f64
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut record = HealthRecord::default();
        record.record_success(Duration::from_millis(4), 1);
        record.record_failure("refused".into(), 2);
        record.record_failure("refused".into(), 3);
        record.record_success(Duration::from_millis(6), 4);

        assert_eq!(record.total_checks, 4);
        assert_eq!(record.successful_checks, 2);
        assert_eq!(record.success_rate, 0.5);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.last_latency_ms, Some(6.0));
        assert_eq!(record.status, HealthState::Healthy);
    }

    #[test]
    fn test_traffic_mark_keeps_probe_counts() {
        let mut record = HealthRecord::default();
        record.record_success(Duration::from_millis(1), 1);
        record.mark_unhealthy("timeout".into());
        assert_eq!(record.status, HealthState::Unhealthy);
        assert_eq!(record.total_checks, 1);
        assert_eq!(record.success_rate, 1.0);
    }
}
