//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map forwarding errors to structured JSON responses
//! - Keep category-level and instance-level failures distinguishable
//!
//! # Design Decisions
//! - Category unavailable → 503 with the known categories
//! - Instance failure → 502, or 504 when the instance timed out
//! - Successful responses stream through untouched, tagged with the instance id

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::http::forward::{FailureCause, ForwardError};

/// Response header naming the instance that served the request.
pub const X_FLEET_INSTANCE: &str = "x-fleet-instance";

impl FailureCause {
    /// Status returned to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            FailureCause::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            FailureCause::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            FailureCause::Connect { .. } | FailureCause::ServerError { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        match self {
            ForwardError::NoInstanceAvailable(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "no_instance_available",
                    "category": e.category,
                    "available_categories": e.available_categories,
                })),
            )
                .into_response(),
            ForwardError::InstanceFailed { instance_id, cause } => {
                (
                    cause.status(),
                    Json(json!({
                        "error": "instance_failed",
                        "instance_id": instance_id,
                        "message": cause.to_string(),
                        "cause": cause,
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// 400 for requests that do not name a category.
pub fn missing_category(available_categories: Vec<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "missing_category",
            "available_categories": available_categories,
        })),
    )
        .into_response()
}
