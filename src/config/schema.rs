//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the fleet router.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::load_balancer::Strategy;

/// Root configuration for the fleet router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    /// Traffic listener configuration.
    pub listener: ListenerConfig,

    /// Admin (query surface) listener configuration.
    pub admin: AdminConfig,

    /// Instance snapshot. Always applied as a full replace.
    pub instances: Vec<InstanceConfig>,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Load balancing strategy selection.
    pub balancer: BalancerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Metrics sampling settings.
    pub monitoring: MonitoringConfig,

    /// Alert thresholds and retention.
    pub alerts: AlertConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One instance descriptor from the load input.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InstanceConfig {
    /// Stable, unique instance identifier.
    pub id: String,

    /// Category pool this instance belongs to (e.g. "database").
    pub category: String,

    /// Hostname or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Process id, when the instance runs on this host. Enables per-process
    /// resource sampling.
    #[serde(default)]
    pub pid: Option<u32>,
}

impl InstanceConfig {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            host: host.into(),
            port,
            weight: default_weight(),
            pid: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// `host:port` as used for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_weight() -> u32 {
    1
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic probing. When disabled, instances are trusted as
    /// healthy, forwarding failures only count against the circuit breaker,
    /// and an open breaker goes half-open after `open_duration_secs`.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Liveness path probed on every instance.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_ms: 5_000,
            path: "/health".to_string(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive forwarding failures before the breaker opens.
    pub failure_threshold: u32,

    /// Open period in seconds. With probing enabled it is reported only and a
    /// breaker leaves the open state on a recovered probe; with probing
    /// disabled it is the wait before the breaker goes half-open.
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_secs: 60,
        }
    }
}

/// Load balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Strategy used when a category has no override.
    pub default_strategy: Strategy,

    /// Per-category strategy overrides.
    pub categories: HashMap<String, Strategy>,
}

impl BalancerConfig {
    pub fn strategy_for(&self, category: &str) -> Strategy {
        self.categories
            .get(category)
            .copied()
            .unwrap_or(self.default_strategy)
    }
}

/// Timeout configuration for the serving path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream forward timeout in milliseconds.
    pub forward_ms: u64,

    /// Whole inbound request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            forward_ms: 30_000,
            request_secs: 60,
        }
    }
}

/// Sampler backing the metrics collector.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
    /// Host / process telemetry via sysinfo.
    #[default]
    System,
    /// Constant zero readings.
    Fixed,
}

/// Metrics collector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Enable periodic sampling.
    pub enabled: bool,

    /// Sampling interval in seconds.
    pub interval_secs: u64,

    /// Points retained per (instance, metric) series.
    pub retained_points: usize,

    /// Resource sampler implementation.
    pub sampler: SamplerKind,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            retained_points: 1440,
            sampler: SamplerKind::System,
        }
    }
}

/// Alert thresholds and retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Average latency above which a high-latency alert fires (ms).
    pub latency_ms: f64,

    /// Error fraction above which a high-error-rate alert fires.
    pub error_rate: f64,

    /// Memory fraction threshold.
    pub memory: f64,

    /// CPU fraction threshold.
    pub cpu: f64,

    /// Disk fraction threshold.
    pub disk: f64,

    /// Alerts older than this are purged, resolved or not.
    pub retention_secs: u64,

    /// How often the retention sweep runs.
    pub sweep_interval_secs: u64,

    /// Default cap on the active alert listing.
    pub list_limit: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            latency_ms: 1_000.0,
            error_rate: 0.1,
            memory: 0.8,
            cpu: 0.8,
            disk: 0.9,
            retention_secs: 7 * 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            list_limit: 50,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin (query surface) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// Optional bearer token. When unset the read-only endpoints are open.
    pub api_key: Option<String>,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
