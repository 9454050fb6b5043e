//! Periodic per-instance sampling.
//!
//! # Responsibilities
//! - Sample resources and traffic of every instance on a fixed interval
//! - Append each value to its bounded history
//! - Recompute the fleet snapshot
//! - Hand the cycle's samples to the alert engine
//!
//! # Design Decisions
//! - Latency and error rate are windowed: counter growth since the last cycle
//! - With no traffic in the window, latency falls back to the last probe latency
//! - A sampler error for one instance never stops the cycle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::alerts::AlertEngine;
use crate::clock::unix_millis;
use crate::config::MonitoringConfig;
use crate::health::HealthProber;
use crate::monitoring::history::{MetricHistory, MetricKind, MetricPoint};
use crate::monitoring::sampler::ResourceSampler;
use crate::monitoring::snapshot::FleetSnapshot;
use crate::registry::{Instance, Registry, TrafficTotals};

/// One cycle's readings for one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSample {
    pub instance_id: String,
    pub category: String,
    /// Unix millis.
    pub timestamp: u64,
    pub memory: f64,
    pub cpu: f64,
    pub disk: f64,
    /// Bytes forwarded to the instance during the window.
    pub bytes_in: u64,
    /// Bytes returned by the instance during the window.
    pub bytes_out: u64,
    pub avg_latency_ms: Option<f64>,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleFailure {
    pub instance_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    pub samples: Vec<InstanceSample>,
    pub failures: Vec<SampleFailure>,
}

pub struct MetricsCollector {
    registry: Arc<Registry>,
    health: Arc<HealthProber>,
    sampler: Arc<dyn ResourceSampler>,
    history: MetricHistory,
    last_totals: DashMap<String, TrafficTotals>,
    latest: DashMap<String, InstanceSample>,
    snapshot: ArcSwap<FleetSnapshot>,
    config: MonitoringConfig,
}

impl MetricsCollector {
    pub fn new(
        registry: Arc<Registry>,
        health: Arc<HealthProber>,
        sampler: Arc<dyn ResourceSampler>,
        config: MonitoringConfig,
    ) -> Self {
        let collector = Self {
            history: MetricHistory::new(config.retained_points),
            registry,
            health,
            sampler,
            last_totals: DashMap::new(),
            latest: DashMap::new(),
            snapshot: ArcSwap::from_pointee(FleetSnapshot::default()),
            config,
        };
        collector.refresh_snapshot();
        collector
    }

    /// Sample every instance once and record the results.
    pub fn collect(&self) -> CollectionReport {
        self.sampler.begin_cycle();
        let now = unix_millis();
        let mut report = CollectionReport::default();

        for instance in self.registry.all() {
            match self.sample_instance(&instance, now) {
                Ok(sample) => {
                    self.record(&sample);
                    report.samples.push(sample);
                }
                Err(error) => {
                    tracing::warn!(instance = %instance.id, error = %error, "Resource sampling failed");
                    report.failures.push(SampleFailure {
                        instance_id: instance.id.clone(),
                        error,
                    });
                }
            }
        }

        self.refresh_snapshot();
        report
    }

    fn sample_instance(&self, instance: &Instance, now: u64) -> Result<InstanceSample, String> {
        let totals = instance.traffic().totals();
        let previous = self
            .last_totals
            .insert(instance.id.clone(), totals)
            .unwrap_or_default();
        let window = totals.since(&previous);

        let resources = self.sampler.sample(instance).map_err(|e| e.to_string())?;
        let avg_latency_ms = window
            .average_latency_ms()
            .or_else(|| self.health.record(&instance.id).and_then(|r| r.last_latency_ms));

        Ok(InstanceSample {
            instance_id: instance.id.clone(),
            category: instance.category.clone(),
            timestamp: now,
            memory: resources.memory,
            cpu: resources.cpu,
            disk: resources.disk,
            bytes_in: window.bytes_in,
            bytes_out: window.bytes_out,
            avg_latency_ms,
            error_rate: window.error_rate(),
        })
    }

    fn record(&self, sample: &InstanceSample) {
        let mut values = vec![
            (MetricKind::Memory, sample.memory),
            (MetricKind::Cpu, sample.cpu),
            (MetricKind::Disk, sample.disk),
            (MetricKind::BytesIn, sample.bytes_in as f64),
            (MetricKind::BytesOut, sample.bytes_out as f64),
            (MetricKind::ErrorRate, sample.error_rate),
        ];
        if let Some(latency) = sample.avg_latency_ms {
            values.push((MetricKind::LatencyMs, latency));
        }
        for (kind, value) in values {
            self.history.push(
                &sample.instance_id,
                kind,
                MetricPoint {
                    timestamp: sample.timestamp,
                    value,
                },
            );
        }
        self.latest.insert(sample.instance_id.clone(), sample.clone());
    }

    /// Rebuild the fleet snapshot from current health and the latest samples.
    pub fn refresh_snapshot(&self) {
        let latencies: HashMap<String, f64> = self
            .latest
            .iter()
            .filter_map(|s| s.avg_latency_ms.map(|l| (s.key().clone(), l)))
            .collect();
        let snapshot = FleetSnapshot::compute(&self.registry.snapshot(), &latencies, unix_millis());
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshot.load_full()
    }

    pub fn latest(&self, id: &str) -> Option<InstanceSample> {
        self.latest.get(id).map(|s| s.value().clone())
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    /// Drop history of instances no longer registered.
    pub fn forget(&self, ids: &[String]) {
        self.history.forget(ids);
        for id in ids {
            self.last_totals.remove(id);
            self.latest.remove(id);
        }
    }

    /// Sample on every tick and feed the alert engine.
    pub async fn run(self: Arc<Self>, alerts: Arc<AlertEngine>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Metrics collection disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            retained_points = self.history.retained(),
            "Metrics collector starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.collect();
                    let evaluation = alerts.evaluate(&report.samples);
                    tracing::debug!(
                        sampled = report.samples.len(),
                        failed = report.failures.len(),
                        raised = evaluation.raised.len(),
                        resolved = evaluation.resolved.len(),
                        "Collection cycle complete"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Metrics collector received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
