//! Read-only views over the fleet.
//!
//! Every method takes `&self` and only reads component state; nothing here
//! can change routing, health, breakers or alerts.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::alerts::{Alert, AlertEngine};
use crate::config::BalancerConfig;
use crate::health::{HealthProber, HealthRecord};
use crate::load_balancer::Strategy;
use crate::monitoring::{CategorySnapshot, FleetSnapshot, InstanceSample, MetricKind, MetricPoint, MetricsCollector};
use crate::registry::{HealthState, Instance, Registry, TrafficTotals};
use crate::resilience::circuit_breaker::{BreakerRegistry, BreakerSnapshot, BreakerState};

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub instances: usize,
    pub categories: usize,
    pub active_alerts: usize,
}

/// Live state of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub id: String,
    pub category: String,
    pub address: String,
    pub weight: u32,
    pub in_flight: usize,
    pub health: HealthState,
    pub breaker: BreakerState,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDetail {
    pub name: String,
    pub strategy: Strategy,
    /// Instances currently eligible for selection.
    pub eligible: usize,
    pub summary: CategorySnapshot,
    pub instances: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceHealth {
    pub instance: InstanceStatus,
    pub record: HealthRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceMetrics {
    pub instance_id: String,
    pub latest: Option<InstanceSample>,
    /// Lifetime traffic counters.
    pub traffic: TrafficTotals,
    pub history: BTreeMap<MetricKind, Vec<MetricPoint>>,
}

#[derive(Clone)]
pub struct FleetQuery {
    registry: Arc<Registry>,
    health: Arc<HealthProber>,
    breakers: Arc<BreakerRegistry>,
    collector: Arc<MetricsCollector>,
    alerts: Arc<AlertEngine>,
    balancer: BalancerConfig,
}

impl FleetQuery {
    pub fn new(
        registry: Arc<Registry>,
        health: Arc<HealthProber>,
        breakers: Arc<BreakerRegistry>,
        collector: Arc<MetricsCollector>,
        alerts: Arc<AlertEngine>,
        balancer: BalancerConfig,
    ) -> Self {
        Self {
            registry,
            health,
            breakers,
            collector,
            alerts,
            balancer,
        }
    }

    fn status_of(&self, instance: &Instance) -> InstanceStatus {
        InstanceStatus {
            id: instance.id.clone(),
            category: instance.category.clone(),
            address: instance.address.clone(),
            weight: instance.weight(),
            in_flight: instance.in_flight(),
            health: instance.health(),
            breaker: self.breakers.state(&instance.id),
        }
    }

    fn health_of(&self, instance: &Instance) -> InstanceHealth {
        InstanceHealth {
            instance: self.status_of(instance),
            record: self.health.record(&instance.id).unwrap_or_default(),
        }
    }

    pub fn status(&self) -> SystemStatus {
        let snapshot = self.registry.snapshot();
        SystemStatus {
            version: env!("CARGO_PKG_VERSION"),
            status: "operational",
            instances: snapshot.instances().len(),
            categories: snapshot.categories().len(),
            active_alerts: self.alerts.active(usize::MAX).len(),
        }
    }

    /// Fleet snapshot from the last collection cycle.
    pub fn overview(&self) -> Arc<FleetSnapshot> {
        self.collector.snapshot()
    }

    pub fn categories(&self) -> BTreeMap<String, CategorySnapshot> {
        self.collector.snapshot().categories.clone()
    }

    pub fn category(&self, name: &str) -> Option<CategoryDetail> {
        let pool = self.registry.pool(name)?;
        let instances: Vec<_> = pool.instances().iter().map(|i| self.status_of(i)).collect();
        let eligible = instances
            .iter()
            .filter(|i| i.health == HealthState::Healthy && i.breaker != BreakerState::Open)
            .count();
        Some(CategoryDetail {
            name: name.to_string(),
            strategy: self.balancer.strategy_for(name),
            eligible,
            summary: self
                .collector
                .snapshot()
                .categories
                .get(name)
                .cloned()
                .unwrap_or_default(),
            instances,
        })
    }

    pub fn instance_health(&self, id: &str) -> Option<InstanceHealth> {
        self.registry.get(id).map(|i| self.health_of(&i))
    }

    pub fn instance_metrics(&self, id: &str) -> Option<InstanceMetrics> {
        let instance = self.registry.get(id)?;
        Some(InstanceMetrics {
            instance_id: instance.id.clone(),
            latest: self.collector.latest(id),
            traffic: instance.traffic().totals(),
            history: self.collector.history().instance(id).unwrap_or_default(),
        })
    }

    /// Health of every registered instance, in load order.
    pub fn health(&self) -> Vec<InstanceHealth> {
        self.registry.all().iter().map(|i| self.health_of(i)).collect()
    }

    /// Breakers that have seen traffic, keyed by instance id.
    pub fn breakers(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers.snapshots().into_iter().collect()
    }

    /// Unresolved alerts, most recent first; `None` uses the configured cap.
    pub fn active_alerts(&self, limit: Option<usize>) -> Vec<Alert> {
        self.alerts.active(limit.unwrap_or_else(|| self.alerts.default_limit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertConfig, CircuitBreakerConfig, HealthCheckConfig, InstanceConfig, MonitoringConfig};
    use crate::health::HttpProbe;
    use crate::monitoring::{FixedSampler, ResourceSample};

    fn query() -> (FleetQuery, Arc<Registry>, Arc<BreakerRegistry>, Arc<MetricsCollector>) {
        let registry = Arc::new(
            Registry::from_instances(&[
                InstanceConfig::new("A", "db", "127.0.0.1", 7001),
                InstanceConfig::new("B", "db", "127.0.0.1", 7002),
                InstanceConfig::new("C", "fs", "127.0.0.1", 7003),
            ])
            .unwrap(),
        );
        let health = Arc::new(HealthProber::new(
            registry.clone(),
            Arc::new(HttpProbe::new("/health")),
            HealthCheckConfig::default(),
        ));
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let collector = Arc::new(MetricsCollector::new(
            registry.clone(),
            health.clone(),
            Arc::new(FixedSampler::new(ResourceSample::new(0.1, 0.1, 0.1))),
            MonitoringConfig::default(),
        ));
        let alerts = Arc::new(AlertEngine::new(AlertConfig::default()));
        let query = FleetQuery::new(
            registry.clone(),
            health,
            breakers.clone(),
            collector.clone(),
            alerts,
            BalancerConfig::default(),
        );
        (query, registry, breakers, collector)
    }

    #[test]
    fn test_category_detail() {
        let (query, registry, breakers, _) = query();
        registry.get("A").unwrap().set_health(HealthState::Healthy);
        registry.get("B").unwrap().set_health(HealthState::Healthy);
        for _ in 0..5 {
            breakers.record_failure("B");
        }

        let detail = query.category("db").unwrap();
        assert_eq!(detail.instances.len(), 2);
        assert_eq!(detail.eligible, 1);
        assert_eq!(detail.instances[1].breaker, BreakerState::Open);
        assert!(query.category("ai-ml").is_none());
    }

    #[test]
    fn test_instance_views() {
        let (query, _, _, collector) = query();
        collector.collect();
        let metrics = query.instance_metrics("C").unwrap();
        assert_eq!(metrics.latest.unwrap().memory, 0.1);
        assert_eq!(metrics.history[&MetricKind::Memory].len(), 1);

        let health = query.instance_health("C").unwrap();
        assert_eq!(health.record.total_checks, 0);
        assert!(query.instance_health("Z").is_none());
        assert_eq!(query.health().len(), 3);
    }

    #[test]
    fn test_overview_and_status() {
        let (query, _, _, _) = query();
        let overview = query.overview();
        assert_eq!(overview.total, 3);
        assert_eq!(query.categories().len(), 2);
        let status = query.status();
        assert_eq!((status.instances, status.categories, status.active_alerts), (3, 2, 0));
    }
}
