//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fleet_requests_total` (counter): forwarded requests by category, status, instance
//! - `fleet_request_duration_seconds` (histogram): forward latency
//! - `fleet_instance_in_flight` (gauge): requests in flight per instance
//! - `fleet_instance_health` (gauge): 1=healthy, 0=otherwise
//! - `fleet_breaker_open` (gauge): 1=open, 0=otherwise
//! - `fleet_alerts_active` (gauge): unresolved alerts

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "fleet_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "fleet_request_duration_seconds";
pub const INSTANCE_IN_FLIGHT: &str = "fleet_instance_in_flight";
pub const INSTANCE_HEALTH: &str = "fleet_instance_health";
pub const BREAKER_OPEN: &str = "fleet_breaker_open";
pub const ALERTS_ACTIVE: &str = "fleet_alerts_active";

/// Install the Prometheus recorder with its own scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_request(category: &str, status: u16, instance: &str, started: Instant) {
    let labels = [
        ("category", category.to_string()),
        ("status", status.to_string()),
        ("instance", instance.to_string()),
    ];
    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, &labels).record(started.elapsed().as_secs_f64());
}

pub fn record_in_flight(instance: &str, in_flight: usize) {
    gauge!(INSTANCE_IN_FLIGHT, "instance" => instance.to_string()).set(in_flight as f64);
}

pub fn record_instance_health(instance: &str, healthy: bool) {
    gauge!(INSTANCE_HEALTH, "instance" => instance.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_breaker_open(instance: &str, open: bool) {
    gauge!(BREAKER_OPEN, "instance" => instance.to_string()).set(if open { 1.0 } else { 0.0 });
}

pub fn record_alerts_active(count: usize) {
    gauge!(ALERTS_ACTIVE).set(count as f64);
}
