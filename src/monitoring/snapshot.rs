//! Fleet-wide aggregate view.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::registry::{HealthState, RegistrySnapshot};

/// Counts and latency of one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorySnapshot {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub in_flight: usize,
    pub average_latency_ms: Option<f64>,
}

/// Aggregate health and latency of the whole fleet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSnapshot {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub average_latency_ms: Option<f64>,
    pub categories: BTreeMap<String, CategorySnapshot>,
    /// Unix millis.
    pub generated_at: u64,
}

#[derive(Default)]
struct LatencyMean {
    sum: f64,
    count: usize,
}

impl LatencyMean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl FleetSnapshot {
    /// Aggregate `registry` using the latest per-instance latency readings.
    pub fn compute(registry: &RegistrySnapshot, latencies: &HashMap<String, f64>, now: u64) -> Self {
        let mut snapshot = FleetSnapshot {
            generated_at: now,
            ..FleetSnapshot::default()
        };
        let mut fleet_latency = LatencyMean::default();

        for category in registry.categories() {
            let Some(pool) = registry.pool(&category) else {
                continue;
            };
            let mut entry = CategorySnapshot::default();
            let mut latency = LatencyMean::default();
            for instance in pool.instances() {
                entry.total += 1;
                entry.in_flight += instance.in_flight();
                match instance.health() {
                    HealthState::Healthy => entry.healthy += 1,
                    HealthState::Unhealthy => entry.unhealthy += 1,
                    HealthState::Unknown => entry.unknown += 1,
                }
                let reading = latencies.get(&instance.id).copied();
                latency.add(reading);
                fleet_latency.add(reading);
            }
            entry.average_latency_ms = latency.mean();

            snapshot.total += entry.total;
            snapshot.healthy += entry.healthy;
            snapshot.unhealthy += entry.unhealthy;
            snapshot.unknown += entry.unknown;
            snapshot.categories.insert(category, entry);
        }

        snapshot.average_latency_ms = fleet_latency.mean();
        snapshot
    }
}
