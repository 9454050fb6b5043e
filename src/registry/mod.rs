//! Instance registry.
//!
//! # Data Flow
//! ```text
//! Instance snapshot (config load / hot reload)
//!     → validation (ids, categories, addresses)
//!     → build new RegistrySnapshot (pools in load order)
//!     → atomic swap (arc-swap); readers never block
//!     → ReloadSummary handed to the Fleet, which resets
//!       health / breaker / metrics state of removed ids
//! ```
//!
//! # Design Decisions
//! - Full-replace semantics; a reload is never a diff
//! - A retained id with an unchanged endpoint keeps its `Instance`, so
//!   connection guards taken before the reload stay balanced
//! - Unknown categories are an empty list, not an error

pub mod instance;
pub mod pool;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::validation::{validate_instances, ValidationError};
use crate::config::{ConfigError, InstanceConfig};

pub use instance::{ConnectionGuard, HealthState, Instance, TrafficCounters, TrafficTotals};
pub use pool::CategoryPool;

/// Immutable view of the instance set at one point in time.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pools: BTreeMap<String, Arc<CategoryPool>>,
    by_id: HashMap<String, Arc<Instance>>,
    ordered: Vec<Arc<Instance>>,
}

impl RegistrySnapshot {
    pub fn pool(&self, category: &str) -> Option<&Arc<CategoryPool>> {
        self.pools.get(category)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Instance>> {
        self.by_id.get(id)
    }

    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.ordered
    }

    pub fn categories(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }
}

/// What changed in a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retained: Vec<String>,
}

/// Authoritative set of instances grouped into category pools.
#[derive(Debug, Default)]
pub struct Registry {
    snapshot: ArcSwap<RegistrySnapshot>,
    reload_lock: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding `instances`.
    pub fn from_instances(instances: &[InstanceConfig]) -> Result<Self, ConfigError> {
        let registry = Self::new();
        registry.reload(instances)?;
        Ok(registry)
    }

    /// Atomically replace the whole instance set.
    ///
    /// On error the current snapshot is left untouched.
    pub fn reload(&self, instances: &[InstanceConfig]) -> Result<ReloadSummary, ConfigError> {
        validate_instances(instances).map_err(ConfigError::Validation)?;

        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.snapshot.load_full();

        let mut summary = ReloadSummary::default();
        let mut pools: BTreeMap<String, CategoryPool> = BTreeMap::new();
        let mut by_id = HashMap::with_capacity(instances.len());
        let mut ordered = Vec::with_capacity(instances.len());

        for config in instances {
            let instance = match previous.get(&config.id) {
                Some(existing) if existing.same_endpoint(config) => {
                    existing.set_weight(config.weight);
                    summary.retained.push(config.id.clone());
                    existing.clone()
                }
                existing => {
                    if existing.is_some() {
                        summary.removed.push(config.id.clone());
                    }
                    summary.added.push(config.id.clone());
                    let instance = Instance::new(config).map_err(|_| {
                        ConfigError::Validation(vec![ValidationError::InvalidAddress {
                            id: config.id.clone(),
                            address: config.address(),
                        }])
                    })?;
                    Arc::new(instance)
                }
            };

            pools
                .entry(config.category.clone())
                .or_insert_with(|| CategoryPool::new(config.category.clone()))
                .push(instance.clone());
            by_id.insert(config.id.clone(), instance.clone());
            ordered.push(instance);
        }

        for old in previous.instances() {
            if !by_id.contains_key(&old.id) {
                summary.removed.push(old.id.clone());
            }
        }

        let pools = pools
            .into_iter()
            .map(|(name, pool)| {
                if let Some(old) = previous.pool(&name) {
                    pool.resume_from(old);
                }
                (name, Arc::new(pool))
            })
            .collect();

        self.snapshot.store(Arc::new(RegistrySnapshot {
            pools,
            by_id,
            ordered,
        }));

        tracing::info!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            retained = summary.retained.len(),
            "Registry reloaded"
        );
        Ok(summary)
    }

    /// Current snapshot; cheap to take and safe to hold across awaits.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Instances of `category`; empty for an unknown category.
    pub fn list_category(&self, category: &str) -> Vec<Arc<Instance>> {
        self.snapshot
            .load()
            .pool(category)
            .map(|pool| pool.instances().to_vec())
            .unwrap_or_default()
    }

    pub fn pool(&self, category: &str) -> Option<Arc<CategoryPool>> {
        self.snapshot.load().pool(category).cloned()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Instance>> {
        self.snapshot.load().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Instance>> {
        self.snapshot.load().instances().to_vec()
    }

    /// True while `instance` is the one registered under its id.
    ///
    /// Results that complete after a reload replaced or removed their instance
    /// must not touch state keyed by that id.
    pub fn is_current(&self, instance: &Instance) -> bool {
        self.snapshot
            .load()
            .get(&instance.id)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), instance))
    }

    pub fn categories(&self) -> Vec<String> {
        self.snapshot.load().categories()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().instances().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, category: &str, port: u16) -> InstanceConfig {
        InstanceConfig::new(id, category, "127.0.0.1", port)
    }

    #[test]
    fn test_groups_by_category_in_load_order() {
        let registry = Registry::from_instances(&[
            descriptor("a", "db", 9001),
            descriptor("x", "fs", 9002),
            descriptor("b", "db", 9003),
        ])
        .unwrap();

        let ids: Vec<_> = registry.list_category("db").iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.categories(), vec!["db", "fs"]);
        assert!(registry.list_category("ai-ml").is_empty());
    }

    #[test]
    fn test_reload_replaces_and_reports() {
        let registry = Registry::from_instances(&[
            descriptor("a", "db", 9001),
            descriptor("b", "db", 9002),
            descriptor("c", "db", 9003),
        ])
        .unwrap();
        let a_before = registry.get("a").unwrap();
        let _guard = a_before.acquire();

        let summary = registry
            .reload(&[
                descriptor("a", "db", 9001),
                descriptor("b", "db", 9999),
                descriptor("d", "fs", 9004),
            ])
            .unwrap();

        assert_eq!(summary.retained, vec!["a"]);
        assert_eq!(summary.added, vec!["b", "d"]);
        assert_eq!(summary.removed, vec!["b", "c"]);
        assert!(registry.get("c").is_none());
        // Retained instances keep their live counters.
        assert!(Arc::ptr_eq(&a_before, &registry.get("a").unwrap()));
        assert_eq!(registry.get("a").unwrap().in_flight(), 1);
    }

    #[test]
    fn test_replaced_instance_is_not_current() {
        let registry = Registry::from_instances(&[descriptor("a", "db", 9001), descriptor("b", "db", 9002)]).unwrap();
        let a = registry.get("a").unwrap();
        let b = registry.get("b").unwrap();
        assert!(registry.is_current(&a));

        registry.reload(&[descriptor("a", "db", 9001), descriptor("b", "db", 9102)]).unwrap();
        assert!(registry.is_current(&a));
        assert!(!registry.is_current(&b));
        assert!(registry.is_current(&registry.get("b").unwrap()));

        registry.reload(&[descriptor("b", "db", 9102)]).unwrap();
        assert!(!registry.is_current(&a));
    }

    #[test]
    fn test_invalid_reload_keeps_previous_snapshot() {
        let registry = Registry::from_instances(&[descriptor("a", "db", 9001)]).unwrap();
        let err = registry
            .reload(&[descriptor("a", "db", 9001), descriptor("a", "db", 9002)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reload_updates_weight_in_place() {
        let registry = Registry::from_instances(&[descriptor("a", "db", 9001)]).unwrap();
        registry
            .reload(&[descriptor("a", "db", 9001).with_weight(7)])
            .unwrap();
        assert_eq!(registry.get("a").unwrap().weight(), 7);
    }
}
