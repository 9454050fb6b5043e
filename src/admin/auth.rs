use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::admin::AdminState;

/// Require `Authorization: Bearer {api_key}` when a key is configured.
pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(api_key) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(api_key) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected admin request");
        Err(StatusCode::UNAUTHORIZED)
    }
}
