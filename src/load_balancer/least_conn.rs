//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::LoadBalancer;
use crate::registry::{CategoryPool, Instance};

/// Least connections selector.
/// Selects the instance with the minimum number of in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_instance(&self, _pool: &CategoryPool, candidates: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        // min_by_key keeps the first of equal minima, so ties go to encounter order
        candidates.iter().min_by_key(|i| i.in_flight()).cloned()
    }
}
