//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) and propagate it upstream
//! - Extract the target category from the first path segment
//! - Prepare the remaining path for forwarding
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Payload is opaque; only the URI is inspected

use axum::http::{HeaderName, Uri};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer assigning an `x-request-id` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer copying the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Where an inbound request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub category: String,
    /// Path and query to send to the instance, always starting with `/`.
    pub forward_path: String,
}

impl RequestTarget {
    /// Split `/{category}/{rest}?{query}` into the category and `/{rest}?{query}`.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        let trimmed = uri.path().trim_start_matches('/');
        let (category, rest) = match trimmed.split_once('/') {
            Some((category, rest)) => (category, rest),
            None => (trimmed, ""),
        };
        if category.is_empty() {
            return None;
        }

        let mut forward_path = format!("/{rest}");
        if let Some(query) = uri.query() {
            forward_path.push('?');
            forward_path.push_str(query);
        }
        Some(Self {
            category: category.to_string(),
            forward_path,
        })
    }
}
