//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every instance, concurrently
//! - Bound each probe by its own timeout
//! - Update health records and emit Recovered/Down transitions

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Request;
use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::clock::unix_millis;
use crate::config::HealthCheckConfig;
use crate::health::events::{EventSource, HealthEvent, HealthObserver, Transition};
use crate::health::state::HealthRecord;
use crate::observability::metrics;
use crate::registry::{HealthState, Instance, Registry};

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("non-success status {0}")]
    Status(u16),

    #[error("invalid probe request: {0}")]
    Request(String),
}

/// Liveness check against one instance.
pub trait Probe: Send + Sync {
    fn probe<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<(), ProbeError>>;
}

/// `GET http://{address}{path}`; any 2xx is alive.
pub struct HttpProbe {
    path: String,
    client: Client<HttpConnector, Body>,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            path: path.into(),
            client,
        }
    }
}

impl Probe for HttpProbe {
    fn probe<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<(), ProbeError>> {
        Box::pin(async move {
            let request = Request::builder()
                .method("GET")
                .uri(format!("http://{}{}", instance.address, self.path))
                .header("user-agent", "fleet-router-health-check")
                .body(Body::empty())
                .map_err(|e| ProbeError::Request(e.to_string()))?;

            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ProbeError::Connect(e.to_string()))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(ProbeError::Status(response.status().as_u16()))
            }
        })
    }
}

/// Outcome of one probing cycle.
#[derive(Debug, Default)]
pub struct ProbeCycle {
    pub probed: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub events: Vec<HealthEvent>,
}

/// Owns health records and drives the probe loop.
pub struct HealthProber {
    pub(crate) registry: Arc<Registry>,
    probe: Arc<dyn Probe>,
    pub(crate) records: DashMap<String, HealthRecord>,
    observers: Vec<Arc<dyn HealthObserver>>,
    config: HealthCheckConfig,
}

impl HealthProber {
    pub fn new(registry: Arc<Registry>, probe: Arc<dyn Probe>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            probe,
            records: DashMap::new(),
            observers: Vec::new(),
            config,
        }
    }

    /// Whether the probe loop runs; without it nothing restores health.
    pub fn probing_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Register an observer of health transitions.
    pub fn with_observer(mut self, observer: Arc<dyn HealthObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_ms = self.config.timeout_ms,
            path = %self.config.path,
            "Health prober starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        // A cycle that overruns the interval swallows the missed ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cycle = self.probe_all().await;
                    tracing::debug!(
                        probed = cycle.probed,
                        healthy = cycle.healthy,
                        unhealthy = cycle.unhealthy,
                        transitions = cycle.events.len(),
                        "Probe cycle complete"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered instance once.
    pub async fn probe_all(&self) -> ProbeCycle {
        let instances = self.registry.all();
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let outcomes = join_all(instances.iter().map(|instance| async move {
            let started = Instant::now();
            let result = match time::timeout(timeout, self.probe.probe(instance)).await {
                Ok(Ok(())) => Ok(started.elapsed()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProbeError::Timeout(timeout)),
            };
            let healthy = result.is_ok();
            (healthy, self.record_probe(instance, result))
        }))
        .await;

        let mut cycle = ProbeCycle {
            probed: outcomes.len(),
            ..ProbeCycle::default()
        };
        for (healthy, event) in outcomes {
            if healthy {
                cycle.healthy += 1;
            } else {
                cycle.unhealthy += 1;
            }
            cycle.events.extend(event);
        }
        cycle
    }

    /// Apply one probe result and notify observers of any transition.
    pub fn record_probe(
        &self,
        instance: &Instance,
        result: Result<Duration, ProbeError>,
    ) -> Option<HealthEvent> {
        if !self.registry.is_current(instance) {
            tracing::debug!(instance = %instance.id, "Discarding probe result for a replaced instance");
            return None;
        }
        let now = unix_millis();
        let event = {
            let mut record = self.records.entry(instance.id.clone()).or_default();
            match result {
                Ok(latency) => {
                    record.record_success(latency, now);
                    let previous = instance.set_health(HealthState::Healthy);
                    (previous == HealthState::Unhealthy).then(|| HealthEvent {
                        instance_id: instance.id.clone(),
                        category: instance.category.clone(),
                        transition: Transition::Recovered,
                        source: EventSource::Probe,
                        at: now,
                        reason: None,
                    })
                }
                Err(error) => {
                    tracing::warn!(instance = %instance.id, address = %instance.address, error = %error, "Health check failed");
                    let reason = error.to_string();
                    record.record_failure(reason.clone(), now);
                    let previous = instance.set_health(HealthState::Unhealthy);
                    (previous != HealthState::Unhealthy).then(|| HealthEvent {
                        instance_id: instance.id.clone(),
                        category: instance.category.clone(),
                        transition: Transition::Down,
                        source: EventSource::Probe,
                        at: now,
                        reason: Some(reason),
                    })
                }
            }
        };

        metrics::record_instance_health(&instance.id, instance.is_healthy());
        if let Some(event) = &event {
            self.notify(event);
        }
        event
    }

    pub(crate) fn notify(&self, event: &HealthEvent) {
        match event.transition {
            Transition::Recovered => {
                tracing::info!(instance = %event.instance_id, "Instance recovered")
            }
            Transition::Down => {
                tracing::warn!(instance = %event.instance_id, source = ?event.source, reason = ?event.reason, "Instance down")
            }
        }
        for observer in &self.observers {
            observer.on_health_event(event);
        }
    }

    pub fn record(&self, id: &str) -> Option<HealthRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// All records, sorted by instance id.
    pub fn records(&self) -> Vec<(String, HealthRecord)> {
        let mut all: Vec<_> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop records of instances no longer registered.
    pub fn forget(&self, ids: &[String]) {
        for id in ids {
            self.records.remove(id);
        }
    }
}
