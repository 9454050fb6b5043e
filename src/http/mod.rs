//! HTTP traffic subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → request.rs (category from the first path segment)
//!     → load_balancer::Selector (eligible instance for the category)
//!     → forward.rs (dispatch, breaker and health feedback)
//!     → response.rs (error mapping, instance header)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{FailureCause, ForwardError, Forwarder, HttpUpstream, Upstream, UpstreamError};
pub use request::{RequestTarget, X_REQUEST_ID};
pub use response::X_FLEET_INSTANCE;
pub use server::{AppState, HttpServer};
