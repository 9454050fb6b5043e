//! Fleet traffic routing and health supervision.
//!
//! Requests addressed to a category (`/{category}/...`) are forwarded to a
//! live instance of that category while the fleet is continuously probed,
//! sampled and alerted on.
//!
//! ```text
//!  client ──▶ http::server ──▶ load_balancer::Selector ──▶ http::forward ──▶ instance
//!                                   │        ▲                  │
//!                                   ▼        │                  ▼
//!                              registry   resilience ◀──── health (passive)
//!                                   ▲        ▲
//!                 health::active ───┴────────┴──▶ alerts ◀── monitoring
//!                                                    │
//!                                 admin::FleetQuery ◀┘
//! ```

pub mod admin;
pub mod alerts;
pub mod clock;
pub mod config;
pub mod fleet;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod monitoring;
pub mod observability;
pub mod registry;
pub mod resilience;

pub use config::FleetConfig;
pub use fleet::{Fleet, FleetComponents};
pub use http::HttpServer;
pub use lifecycle::{Shutdown, Supervisor};
