//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::FleetConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<FleetConfig, ConfigError> {
    let config: FleetConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FleetConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_config("instances = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = parse_config(
            r#"
            [[instances]]
            id = ""
            category = "db"
            host = "127.0.0.1"
            port = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/fleet.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_demo_config_parses() {
        let config = parse_config(include_str!("../../fleet.toml")).unwrap();
        assert_eq!(config.instances.len(), 5);
        assert_eq!(config.instances[3].weight, 3);
        assert_eq!(config.monitoring.retained_points, 1440);
    }
}
