//! Admin query listener.
//!
//! Serves the read-only [`FleetQuery`] views as JSON on a separate listener,
//! optionally behind a bearer token.

pub mod auth;
pub mod handlers;
pub mod query;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
pub use self::query::FleetQuery;

#[derive(Clone)]
pub struct AdminState {
    pub query: FleetQuery,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(query: FleetQuery, api_key: Option<String>) -> Self {
        Self {
            query,
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/fleet", get(get_fleet))
        .route("/admin/categories", get(get_categories))
        .route("/admin/categories/{name}", get(get_category))
        .route("/admin/instances/{id}/health", get(get_instance_health))
        .route("/admin/instances/{id}/metrics", get(get_instance_metrics))
        .route("/admin/health", get(get_health))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/alerts", get(get_alerts))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin server starting");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    tracing::info!("Admin server stopped");
    Ok(())
}
