//! Alert records.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    InstanceDown,
    HighLatency,
    HighErrorRate,
    HighResource,
}

impl AlertKind {
    /// Fixed kind to severity table.
    pub fn severity(self) -> Severity {
        match self {
            AlertKind::InstanceDown => Severity::Critical,
            AlertKind::HighErrorRate => Severity::Error,
            AlertKind::HighLatency | AlertKind::HighResource => Severity::Warning,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::InstanceDown => "instance-down",
            AlertKind::HighLatency => "high-latency",
            AlertKind::HighErrorRate => "high-error-rate",
            AlertKind::HighResource => "high-resource",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub instance_id: String,
    pub severity: Severity,
    pub message: String,
    /// Unix millis.
    pub created_at: u64,
    pub resolved: bool,
    pub resolved_at: Option<u64>,
}

impl Alert {
    pub fn new(kind: AlertKind, instance_id: impl Into<String>, message: impl Into<String>, now: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            instance_id: instance_id.into(),
            severity: kind.severity(),
            message: message.into(),
            created_at: now,
            resolved: false,
            resolved_at: None,
        }
    }

    pub(crate) fn resolve(&mut self, now: u64) {
        self.resolved = true;
        self.resolved_at = Some(now);
    }
}
