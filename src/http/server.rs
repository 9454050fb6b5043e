//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding fallback
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and drain on shutdown
//! - Dispatch `/{category}/...` requests to the forwarder

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::fleet::Fleet;
use crate::http::forward::Forwarder;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestTarget, X_REQUEST_ID};
use crate::http::response::missing_category;
use crate::registry::Registry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub registry: Arc<Registry>,
}

/// Traffic listener of the fleet router.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(fleet: &Fleet) -> Self {
        let state = AppState {
            forwarder: fleet.forwarder().clone(),
            registry: fleet.registry().clone(),
        };
        let request_timeout = Duration::from_secs(fleet.config().timeouts.request_secs);
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        // Last layer added runs first: the id is set before tracing sees the request.
        Router::new()
            .fallback(forward_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The assembled router, for in-process serving and tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(target) = RequestTarget::from_uri(request.uri()) else {
        return missing_category(state.registry.categories());
    };

    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        category = %target.category,
        path = %target.forward_path,
        "Forwarding request"
    );

    let (mut parts, body) = request.into_parts();
    parts.uri = match target.forward_path.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return (StatusCode::BAD_REQUEST, "Malformed request path").into_response(),
    };

    match state.forwarder.route(&target.category, Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(request_id = %request_id, error = %e, "Request not served");
            e.into_response()
        }
    }
}
