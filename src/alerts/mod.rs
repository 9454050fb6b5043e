//! Alerting on health transitions and sampled metrics.
//!
//! # Data Flow
//! ```text
//! HealthProber ──(HealthObserver)──▶ engine.rs: instance-down raise/resolve
//! MetricsCollector ──(samples)─────▶ engine.rs: latency/error/resource thresholds
//! sweep tick ──────────────────────▶ engine.rs: retention purge
//! ```

pub mod engine;
pub mod types;

pub use engine::{AlertEngine, EvaluationReport, SkippedSample};
pub use types::{Alert, AlertKind, Severity};
