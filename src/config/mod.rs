//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FleetConfig (validated, immutable)
//!     → instances handed to Registry as a full-replace snapshot
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Fleet::reload swaps the instance set atomically
//! ```
//!
//! # Design Decisions
//! - Instance membership is always a full snapshot, never a diff
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AlertConfig, BalancerConfig, CircuitBreakerConfig, FleetConfig,
    HealthCheckConfig, InstanceConfig, ListenerConfig, LogFormat, MonitoringConfig,
    ObservabilityConfig, SamplerKind, TimeoutConfig,
};
