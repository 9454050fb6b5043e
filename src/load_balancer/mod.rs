//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request for category
//!     → selector.rs (pool lookup, drop unhealthy / breaker-open instances)
//!     → Apply load balancing strategy:
//!         - round_robin.rs (rotate with the pool's cursor)
//!         - least_conn.rs (pick instance with fewest in-flight requests)
//!         - weighted.rs (weighted random draw)
//!     → Return instance or NoInstanceAvailable
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless; the pool owns the round-robin cursor
//! - Strategy selection per category, round-robin by default
//! - Empty candidate set is an expected outcome, not a fault

pub mod least_conn;
pub mod round_robin;
pub mod selector;
pub mod weighted;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::{CategoryPool, Instance};

pub use selector::{NoInstanceAvailable, Selector};

/// A load balancing algorithm over pre-filtered candidates.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    fn next_instance(&self, pool: &CategoryPool, candidates: &[Arc<Instance>]) -> Option<Arc<Instance>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
    Weighted,
}

static ROUND_ROBIN: round_robin::RoundRobin = round_robin::RoundRobin;
static LEAST_CONNECTIONS: least_conn::LeastConnections = least_conn::LeastConnections;
static WEIGHTED: weighted::Weighted = weighted::Weighted;

impl Strategy {
    pub fn balancer(self) -> &'static dyn LoadBalancer {
        match self {
            Strategy::RoundRobin => &ROUND_ROBIN,
            Strategy::LeastConnections => &LEAST_CONNECTIONS,
            Strategy::Weighted => &WEIGHTED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::LeastConnections => "least-connections",
            Strategy::Weighted => "weighted",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown load balancing strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" | "roundrobin" => Ok(Strategy::RoundRobin),
            "least-connections" | "least_connections" | "leastconnections" => {
                Ok(Strategy::LeastConnections)
            }
            "weighted" => Ok(Strategy::Weighted),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}
