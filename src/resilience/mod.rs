//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forward outcome:
//!     → circuit_breaker.rs (count consecutive failures, open at threshold)
//! Health prober Recovered event:
//!     → circuit_breaker.rs (open → half-open)
//! Selector:
//!     → circuit_breaker.rs (exclude open instances)
//! ```
//!
//! # Design Decisions
//! - No implicit retries; a failed forward is one failed request
//! - Forward deadlines live in the forwarder, probe deadlines in the prober

pub mod circuit_breaker;
