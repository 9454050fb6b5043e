//! Weighted random load balancing strategy.

use std::sync::Arc;

use rand::Rng;

use crate::load_balancer::LoadBalancer;
use crate::registry::{CategoryPool, Instance};

/// Weighted selector.
/// Each candidate wins with probability `weight / total_weight`.
#[derive(Debug, Default)]
pub struct Weighted;

impl Weighted {
    pub fn new() -> Self {
        Self
    }
}

/// Walk `candidates` accumulating weight until `draw` falls inside a share.
///
/// `draw` must be in `[0, total_weight)`. Zero-weight instances own an empty
/// share and can never be returned.
pub fn pick_weighted(candidates: &[Arc<Instance>], draw: u64) -> Option<Arc<Instance>> {
    let mut upper = 0u64;
    for candidate in candidates {
        upper += u64::from(candidate.weight());
        if draw < upper {
            return Some(candidate.clone());
        }
    }
    None
}

pub fn total_weight(candidates: &[Arc<Instance>]) -> u64 {
    candidates.iter().map(|i| u64::from(i.weight())).sum()
}

impl LoadBalancer for Weighted {
    fn next_instance(&self, _pool: &CategoryPool, candidates: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        let total = total_weight(candidates);
        if total == 0 {
            return None;
        }
        let draw = rand::thread_rng().gen_range(0..total);
        pick_weighted(candidates, draw)
    }
}
