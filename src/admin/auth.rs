//! Bearer-token guard for the admin API.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::server::AppState;

/// Whether an `Authorization` header value carries `api_key`.
pub fn is_authorized(header_value: Option<&str>, api_key: &str) -> bool {
    match header_value.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) => !api_key.is_empty() && token.trim() == api_key,
        None => false,
    }
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if is_authorized(auth_header, &state.config.admin.api_key) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_matching() {
        assert!(is_authorized(Some("Bearer s3cret"), "s3cret"));
        assert!(!is_authorized(Some("Bearer wrong"), "s3cret"));
        assert!(!is_authorized(Some("s3cret"), "s3cret"));
        assert!(!is_authorized(None, "s3cret"));
        assert!(!is_authorized(Some("Bearer "), ""));
    }
}
