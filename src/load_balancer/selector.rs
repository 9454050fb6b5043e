//! Instance selection for a category.
//!
//! # Responsibilities
//! - Look up the category pool
//! - Filter to healthy instances whose breaker is not open
//! - Delegate the choice to the configured strategy

use std::sync::Arc;

use serde::Serialize;

use crate::load_balancer::Strategy;
use crate::registry::{Instance, Registry};
use crate::resilience::circuit_breaker::BreakerRegistry;

/// Nothing in the category can take traffic right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("no instance available in category '{category}'")]
pub struct NoInstanceAvailable {
    pub category: String,
    /// Every category currently registered.
    pub available_categories: Vec<String>,
}

/// Picks instances for requests.
#[derive(Debug, Clone)]
pub struct Selector {
    registry: Arc<Registry>,
    breakers: Arc<BreakerRegistry>,
}

impl Selector {
    pub fn new(registry: Arc<Registry>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { registry, breakers }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Instances of `category` that may receive traffic, in pool order.
    pub fn eligible(&self, category: &str) -> Vec<Arc<Instance>> {
        self.registry
            .list_category(category)
            .into_iter()
            .filter(|i| i.is_healthy() && self.breakers.allows_traffic(&i.id))
            .collect()
    }

    pub fn select(&self, category: &str, strategy: Strategy) -> Result<Arc<Instance>, NoInstanceAvailable> {
        let snapshot = self.registry.snapshot();
        let chosen = snapshot.pool(category).and_then(|pool| {
            let candidates: Vec<_> = pool
                .instances()
                .iter()
                .filter(|i| i.is_healthy() && self.breakers.allows_traffic(&i.id))
                .cloned()
                .collect();
            strategy.balancer().next_instance(pool, &candidates)
        });

        match chosen {
            Some(instance) => {
                tracing::trace!(category = %category, strategy = %strategy, instance = %instance.id, "Instance selected");
                Ok(instance)
            }
            None => {
                tracing::debug!(category = %category, strategy = %strategy, "No instance available");
                Err(NoInstanceAvailable {
                    category: category.to_string(),
                    available_categories: snapshot.categories(),
                })
            }
        }
    }
}
