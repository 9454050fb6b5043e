//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every instance concurrently (per-probe timeout)
//!     → Update state.rs records + instance health flag
//!     → Emit Recovered / Down to observers (events.rs)
//!
//! Passive health checks (passive.rs):
//!     Forwarding failure observed
//!     → Mark instance unhealthy immediately
//!     → Emit Down if it was not already unhealthy
//!
//! Observers:
//!     → Circuit breaker registry (Recovered → half-open)
//!     → Alert engine (Down → instance-down alert, Recovered → resolve)
//! ```
//!
//! # Design Decisions
//! - One failed probe marks unhealthy; one success recovers
//! - Health state is per-instance, not per-pool
//! - A probe failure is never surfaced to request callers

pub mod active;
pub mod events;
pub mod passive;
pub mod state;

pub use active::{HealthProber, HttpProbe, Probe, ProbeCycle, ProbeError};
pub use events::{EventSource, HealthEvent, HealthObserver, Transition};
pub use state::HealthRecord;
