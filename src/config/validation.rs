//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check instance descriptors (non-empty ids, unique ids, dialable address)
//! - Validate value ranges (intervals > 0, fractions within (0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FleetConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use url::Url;

use crate::config::schema::{FleetConfig, InstanceConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("instance #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("instance '{id}' has an empty category")]
    EmptyCategory { id: String },

    #[error("duplicate instance id '{id}'")]
    DuplicateId { id: String },

    #[error("instance '{id}' has an invalid address '{address}'")]
    InvalidAddress { id: String, address: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within (0, 1], got {value}")]
    FractionOutOfRange { field: &'static str, value: f64 },
}

/// Validate an instance snapshot on its own (used on every registry reload).
pub fn validate_instances(instances: &[InstanceConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, instance) in instances.iter().enumerate() {
        if instance.id.trim().is_empty() {
            errors.push(ValidationError::EmptyId { index });
            continue;
        }
        if instance.category.trim().is_empty() {
            errors.push(ValidationError::EmptyCategory {
                id: instance.id.clone(),
            });
        }
        if !seen.insert(instance.id.as_str()) {
            errors.push(ValidationError::DuplicateId {
                id: instance.id.clone(),
            });
        }
        if instance.host.trim().is_empty()
            || instance.port == 0
            || Url::parse(&format!("http://{}", instance.address())).is_err()
        {
            errors.push(ValidationError::InvalidAddress {
                id: instance.id.clone(),
                address: instance.address(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the whole configuration.
pub fn validate_config(config: &FleetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_instances(&config.instances) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    let nonzero = [
        ("health_check.interval_secs", config.health_check.interval_secs),
        ("health_check.timeout_ms", config.health_check.timeout_ms),
        ("circuit_breaker.failure_threshold", u64::from(config.circuit_breaker.failure_threshold)),
        ("timeouts.forward_ms", config.timeouts.forward_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("monitoring.interval_secs", config.monitoring.interval_secs),
        ("monitoring.retained_points", config.monitoring.retained_points as u64),
        ("alerts.sweep_interval_secs", config.alerts.sweep_interval_secs),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let fractions = [
        ("alerts.error_rate", config.alerts.error_rate),
        ("alerts.memory", config.alerts.memory),
        ("alerts.cpu", config.alerts.cpu),
        ("alerts.disk", config.alerts.disk),
    ];
    for (field, value) in fractions {
        if !(value > 0.0 && value <= 1.0) {
            errors.push(ValidationError::FractionOutOfRange { field, value });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
