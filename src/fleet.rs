//! Component wiring.
//!
//! `Fleet` owns one handle per component and is the only place they are
//! connected: health transitions flow to the breaker registry and the alert
//! engine through [`HealthObserver`](crate::health::HealthObserver), the
//! forwarder reports back to both the breakers and the prober, and the query
//! surface reads from everything.

use std::sync::Arc;
use std::time::Duration;

use crate::admin::FleetQuery;
use crate::alerts::AlertEngine;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, FleetConfig, InstanceConfig, SamplerKind};
use crate::health::{HealthProber, HttpProbe, Probe};
use crate::http::forward::{Forwarder, HttpUpstream, Upstream};
use crate::load_balancer::Selector;
use crate::monitoring::{FixedSampler, MetricsCollector, ResourceSample, ResourceSampler, SystemSampler};
use crate::registry::{HealthState, Registry, ReloadSummary};
use crate::resilience::circuit_breaker::BreakerRegistry;

/// Pluggable I/O edges of the fleet.
pub struct FleetComponents {
    pub probe: Arc<dyn Probe>,
    pub upstream: Arc<dyn Upstream>,
    pub sampler: Arc<dyn ResourceSampler>,
}

impl FleetComponents {
    /// Network probe and client, plus the sampler named in `config`.
    pub fn from_config(config: &FleetConfig) -> Self {
        let sampler: Arc<dyn ResourceSampler> = match config.monitoring.sampler {
            SamplerKind::System => Arc::new(SystemSampler::new()),
            SamplerKind::Fixed => Arc::new(FixedSampler::new(ResourceSample::default())),
        };
        Self {
            probe: Arc::new(HttpProbe::new(config.health_check.path.clone())),
            upstream: Arc::new(HttpUpstream::new()),
            sampler,
        }
    }
}

pub struct Fleet {
    config: FleetConfig,
    registry: Arc<Registry>,
    breakers: Arc<BreakerRegistry>,
    health: Arc<HealthProber>,
    forwarder: Arc<Forwarder>,
    collector: Arc<MetricsCollector>,
    alerts: Arc<AlertEngine>,
}

impl Fleet {
    pub fn from_config(config: FleetConfig) -> Result<Self, ConfigError> {
        let components = FleetComponents::from_config(&config);
        Self::with_components(config, components)
    }

    /// Wire the fleet around the given I/O edges.
    pub fn with_components(config: FleetConfig, components: FleetComponents) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let registry = Arc::new(Registry::from_instances(&config.instances)?);
        let breakers = BreakerRegistry::new(config.circuit_breaker.clone());
        // Nothing would report a recovery.
        let breakers = Arc::new(if config.health_check.enabled {
            breakers
        } else {
            breakers.with_timed_recovery()
        });
        let alerts = Arc::new(AlertEngine::new(config.alerts.clone()));
        let health = Arc::new(
            HealthProber::new(registry.clone(), components.probe, config.health_check.clone())
                .with_observer(breakers.clone())
                .with_observer(alerts.clone()),
        );
        let forwarder = Arc::new(Forwarder::new(
            Selector::new(registry.clone(), breakers.clone()),
            breakers.clone(),
            health.clone(),
            components.upstream,
            config.balancer.clone(),
            Duration::from_millis(config.timeouts.forward_ms),
        ));
        let collector = Arc::new(MetricsCollector::new(
            registry.clone(),
            health.clone(),
            components.sampler,
            config.monitoring.clone(),
        ));

        let fleet = Self {
            config,
            registry,
            breakers,
            health,
            forwarder,
            collector,
            alerts,
        };
        fleet.trust_without_probing(&fleet.registry.all().iter().map(|i| i.id.clone()).collect::<Vec<_>>());
        fleet.collector.refresh_snapshot();

        tracing::info!(
            instances = fleet.registry.len(),
            categories = fleet.registry.categories().len(),
            "Fleet initialized"
        );
        Ok(fleet)
    }

    /// With probing disabled nothing would ever leave `Unknown`.
    fn trust_without_probing(&self, ids: &[String]) {
        if self.config.health_check.enabled {
            return;
        }
        for id in ids {
            if let Some(instance) = self.registry.get(id) {
                instance.set_health(HealthState::Healthy);
            }
        }
    }

    /// Replace the instance set and drop per-instance state of removed ids.
    ///
    /// An id whose endpoint changed counts as removed, so its old health,
    /// breaker, samples and open alerts do not carry over.
    ///
    /// An invalid set is rejected and the current one stays in service.
    pub fn reload(&self, instances: &[InstanceConfig]) -> Result<ReloadSummary, ConfigError> {
        let summary = self.registry.reload(instances)?;
        self.health.forget(&summary.removed);
        self.breakers.forget(&summary.removed);
        self.collector.forget(&summary.removed);
        self.alerts.forget(&summary.removed);
        self.trust_without_probing(&summary.added);
        self.collector.refresh_snapshot();
        Ok(summary)
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn health(&self) -> &Arc<HealthProber> {
        &self.health
    }

    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn query(&self) -> FleetQuery {
        FleetQuery::new(
            self.registry.clone(),
            self.health.clone(),
            self.breakers.clone(),
            self.collector.clone(),
            self.alerts.clone(),
            self.config.balancer.clone(),
        )
    }
}
