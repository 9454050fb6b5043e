//! Threshold evaluation and the alert book.
//!
//! # Responsibilities
//! - Raise one alert per (kind, instance) while a condition holds
//! - Resolve metric alerts once a fresh sample is back under threshold
//! - Raise and resolve instance-down alerts from health transitions
//! - Purge alerts past the retention window
//! - Resolve open alerts of instances removed or replaced by a reload
//!
//! # Design Decisions
//! - One mutex over the whole book; evaluation and health events serialize on it
//! - A threshold is crossed when the value strictly exceeds it
//! - Samples with non-finite values are skipped and reported, never evaluated

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::alerts::types::{Alert, AlertKind};
use crate::clock::unix_millis;
use crate::config::AlertConfig;
use crate::health::{HealthEvent, HealthObserver, Transition};
use crate::monitoring::InstanceSample;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSample {
    pub instance_id: String,
    pub reason: String,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub evaluated: usize,
    pub raised: Vec<Alert>,
    pub resolved: Vec<Alert>,
    pub skipped: Vec<SkippedSample>,
}

#[derive(Debug, Default)]
struct AlertBook {
    /// Creation order.
    alerts: Vec<Alert>,
}

impl AlertBook {
    fn unresolved_mut(&mut self, kind: AlertKind, instance_id: &str) -> Option<&mut Alert> {
        self.alerts
            .iter_mut()
            .find(|a| !a.resolved && a.kind == kind && a.instance_id == instance_id)
    }

    fn raise(&mut self, kind: AlertKind, instance_id: &str, message: String, now: u64) -> Option<Alert> {
        if self.unresolved_mut(kind, instance_id).is_some() {
            return None;
        }
        let alert = Alert::new(kind, instance_id, message, now);
        tracing::warn!(
            alert = %alert.id,
            kind = %kind,
            instance = %instance_id,
            severity = ?alert.severity,
            message = %alert.message,
            "Alert raised"
        );
        self.alerts.push(alert.clone());
        Some(alert)
    }

    fn resolve(&mut self, kind: AlertKind, instance_id: &str, now: u64) -> Option<Alert> {
        let alert = self.unresolved_mut(kind, instance_id)?;
        alert.resolve(now);
        tracing::info!(alert = %alert.id, kind = %kind, instance = %instance_id, "Alert resolved");
        Some(alert.clone())
    }

    fn active_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.resolved).count()
    }
}

pub struct AlertEngine {
    book: Mutex<AlertBook>,
    config: AlertConfig,
}

fn invalid_reason(sample: &InstanceSample) -> Option<String> {
    let fields = [
        ("memory", sample.memory),
        ("cpu", sample.cpu),
        ("disk", sample.disk),
        ("error_rate", sample.error_rate),
        ("avg_latency_ms", sample.avg_latency_ms.unwrap_or(0.0)),
    ];
    fields
        .iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, value)| format!("{name} is not finite ({value})"))
}

impl AlertEngine {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            book: Mutex::new(AlertBook::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AlertBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one sampling cycle's readings.
    pub fn evaluate(&self, samples: &[InstanceSample]) -> EvaluationReport {
        let now = unix_millis();
        let mut report = EvaluationReport::default();
        let mut book = self.lock();

        for sample in samples {
            if let Some(reason) = invalid_reason(sample) {
                tracing::warn!(instance = %sample.instance_id, reason = %reason, "Skipping invalid sample");
                report.skipped.push(SkippedSample {
                    instance_id: sample.instance_id.clone(),
                    reason,
                });
                continue;
            }
            report.evaluated += 1;

            let mut apply = |kind: AlertKind, breach: Option<String>| {
                let change = match breach {
                    Some(message) => book.raise(kind, &sample.instance_id, message, now).map(|a| (true, a)),
                    None => book.resolve(kind, &sample.instance_id, now).map(|a| (false, a)),
                };
                match change {
                    Some((true, alert)) => report.raised.push(alert),
                    Some((false, alert)) => report.resolved.push(alert),
                    None => {}
                }
            };

            if let Some(latency) = sample.avg_latency_ms {
                let breach = (latency > self.config.latency_ms).then(|| {
                    format!(
                        "average latency {latency:.1}ms exceeds {:.1}ms",
                        self.config.latency_ms
                    )
                });
                apply(AlertKind::HighLatency, breach);
            }

            let breach = (sample.error_rate > self.config.error_rate).then(|| {
                format!(
                    "error rate {:.1}% exceeds {:.1}%",
                    sample.error_rate * 100.0,
                    self.config.error_rate * 100.0
                )
            });
            apply(AlertKind::HighErrorRate, breach);

            let exceeded: Vec<String> = [
                ("memory", sample.memory, self.config.memory),
                ("cpu", sample.cpu, self.config.cpu),
                ("disk", sample.disk, self.config.disk),
            ]
            .iter()
            .filter(|(_, value, threshold)| value > threshold)
            .map(|(name, value, threshold)| {
                format!("{name} {:.1}% exceeds {:.1}%", value * 100.0, threshold * 100.0)
            })
            .collect();
            apply(
                AlertKind::HighResource,
                (!exceeded.is_empty()).then(|| exceeded.join(", ")),
            );
        }

        metrics::record_alerts_active(book.active_count());
        report
    }

    /// Raise or resolve instance-down for a health transition.
    pub fn record_health_event(&self, event: &HealthEvent) -> Option<Alert> {
        let mut book = self.lock();
        let change = match event.transition {
            Transition::Down => {
                let message = match &event.reason {
                    Some(reason) => format!("instance {} is down: {reason}", event.instance_id),
                    None => format!("instance {} is down", event.instance_id),
                };
                book.raise(AlertKind::InstanceDown, &event.instance_id, message, event.at)
            }
            Transition::Recovered => book.resolve(AlertKind::InstanceDown, &event.instance_id, event.at),
        };
        metrics::record_alerts_active(book.active_count());
        change
    }

    /// Resolve every open alert of `ids`; their instances left the registry.
    ///
    /// A replaced instance starts from `Unknown`, so no `Recovered` event
    /// would ever close an instance-down alert raised against its predecessor.
    pub fn forget(&self, ids: &[String]) -> Vec<Alert> {
        let now = unix_millis();
        let mut book = self.lock();
        let mut resolved = Vec::new();
        for alert in book
            .alerts
            .iter_mut()
            .filter(|a| !a.resolved && ids.contains(&a.instance_id))
        {
            alert.resolve(now);
            resolved.push(alert.clone());
        }
        if !resolved.is_empty() {
            tracing::info!(resolved = resolved.len(), "Alerts of removed instances resolved");
        }
        metrics::record_alerts_active(book.active_count());
        resolved
    }

    /// Unresolved alerts, most recent first, at most `limit`.
    pub fn active(&self, limit: usize) -> Vec<Alert> {
        self.lock()
            .alerts
            .iter()
            .rev()
            .filter(|a| !a.resolved)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Every retained alert in creation order.
    pub fn all(&self) -> Vec<Alert> {
        self.lock().alerts.clone()
    }

    /// Drop alerts created before `cutoff` (unix millis), resolved or not.
    pub fn purge_older_than(&self, cutoff: u64) -> usize {
        let mut book = self.lock();
        let before = book.alerts.len();
        book.alerts.retain(|a| a.created_at >= cutoff);
        let purged = before - book.alerts.len();
        metrics::record_alerts_active(book.active_count());
        purged
    }

    /// Apply the retention window relative to `now`.
    pub fn sweep(&self, now: u64) -> usize {
        let retention_ms = self.config.retention_secs.saturating_mul(1000);
        self.purge_older_than(now.saturating_sub(retention_ms))
    }

    pub fn default_limit(&self) -> usize {
        self.config.list_limit
    }

    /// Periodic retention sweep.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.sweep(unix_millis());
                    if purged > 0 {
                        tracing::info!(purged, "Expired alerts purged");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Alert sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl HealthObserver for AlertEngine {
    fn on_health_event(&self, event: &HealthEvent) {
        self.record_health_event(event);
    }
}
