//! Round-robin load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::LoadBalancer;
use crate::registry::{CategoryPool, Instance};

/// Round-robin selector.
/// Advances the pool's cursor once per call, modulo the candidate count.
/// When candidates change between calls the rotation drifts; that is fine.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl RoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RoundRobin {
    fn next_instance(&self, pool: &CategoryPool, candidates: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if candidates.is_empty() {
            return None;
        }
        let index = pool.advance_cursor() % candidates.len();
        Some(candidates[index].clone())
    }
}
