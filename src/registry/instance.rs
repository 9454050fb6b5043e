//! Instance abstraction.
//!
//! # Responsibilities
//! - Represent a single backend worker process
//! - Track in-flight connections (for Least Connections LB)
//! - Track health state (Unknown/Healthy/Unhealthy)
//! - Accumulate traffic counters sampled by the metrics collector

use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::config::InstanceConfig;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    #[default]
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Monotonic traffic counters written by the forwarder.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    latency_micros: AtomicU64,
}

/// Point-in-time copy of [`TrafficCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficTotals {
    pub requests: u64,
    pub failures: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub latency_micros: u64,
}

impl TrafficTotals {
    /// Counter growth since `earlier`.
    pub fn since(&self, earlier: &TrafficTotals) -> TrafficTotals {
        TrafficTotals {
            requests: self.requests.saturating_sub(earlier.requests),
            failures: self.failures.saturating_sub(earlier.failures),
            bytes_in: self.bytes_in.saturating_sub(earlier.bytes_in),
            bytes_out: self.bytes_out.saturating_sub(earlier.bytes_out),
            latency_micros: self.latency_micros.saturating_sub(earlier.latency_micros),
        }
    }

    /// Mean latency in milliseconds, if any request completed.
    pub fn average_latency_ms(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.latency_micros as f64 / self.requests as f64 / 1000.0)
    }

    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

impl TrafficCounters {
    pub fn record(&self, latency: Duration, bytes_in: u64, bytes_out: u64, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn totals(&self) -> TrafficTotals {
        TrafficTotals {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            latency_micros: self.latency_micros.load(Ordering::Relaxed),
        }
    }
}

/// A single instance in a category pool.
#[derive(Debug)]
pub struct Instance {
    /// Stable unique id.
    pub id: String,
    /// Category pool name.
    pub category: String,
    /// `host:port`.
    pub address: String,
    /// Pre-calculated base URL for request rewriting.
    pub base_url: Url,
    /// Local process id, if known.
    pub pid: Option<u32>,

    weight: AtomicU32,
    in_flight: AtomicUsize,
    health: AtomicU8,
    traffic: TrafficCounters,
}

impl Instance {
    /// Build an instance from its descriptor.
    pub fn new(config: &InstanceConfig) -> Result<Self, url::ParseError> {
        let address = config.address();
        let base_url = Url::parse(&format!("http://{}", address))?;
        Ok(Self {
            id: config.id.clone(),
            category: config.category.clone(),
            address,
            base_url,
            pid: config.pid,
            weight: AtomicU32::new(config.weight),
            in_flight: AtomicUsize::new(0),
            health: AtomicU8::new(HealthState::Unknown as u8),
            traffic: TrafficCounters::default(),
        })
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub(crate) fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Ordering::Relaxed);
    }

    /// Number of requests currently being forwarded to this instance.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Increment the in-flight count; the guard decrements it on drop.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            instance: self.clone(),
        }
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.health.load(Ordering::Acquire))
    }

    /// Overwrite the health state, returning the previous one.
    pub fn set_health(&self, state: HealthState) -> HealthState {
        HealthState::from(self.health.swap(state as u8, Ordering::AcqRel))
    }

    pub fn is_healthy(&self) -> bool {
        self.health() == HealthState::Healthy
    }

    pub fn traffic(&self) -> &TrafficCounters {
        &self.traffic
    }

    /// True when `config` describes the same endpoint as this instance.
    pub(crate) fn same_endpoint(&self, config: &InstanceConfig) -> bool {
        self.category == config.category && self.address == config.address() && self.pid == config.pid
    }
}

/// A RAII guard that manages the in-flight connection count.
///
/// Dropping the guard releases the count on every exit path, including
/// cancellation of the future holding it.
#[derive(Debug)]
pub struct ConnectionGuard {
    instance: Arc<Instance>,
}

impl ConnectionGuard {
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Deref for ConnectionGuard {
    type Target = Instance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.instance.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
