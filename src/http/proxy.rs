//! Inference proxy.
//!
//! # Data Flow
//! ```text
//! /v1/* request
//!     → buffer body (bounded), read target model
//!     → ModelLifecycle::resolve (may load on demand)
//!     → rewrite URI onto the handle's base URL
//!     → forward with x-request-id, stream the response back
//! ```

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, Uri},
    response::{IntoResponse, Response},
};

use crate::http::request::{request_id, requested_model, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Forward an inference request to the backend serving its model.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers());
    let (parts, body) = request.into_parts();

    let body_bytes = match axum::body::to_bytes(body, state.config.listener.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::bad_request(format!("failed to read request body: {}", e))
                .into_response()
        }
    };

    let Some(model) = requested_model(&parts.uri, &body_bytes) else {
        return ApiError::bad_request("request does not name a model").into_response();
    };

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        model = %model,
        "Proxying request"
    );

    let handle = match state.lifecycle.resolve(&model).await {
        Ok(handle) => handle,
        Err(err) => {
            let err = ApiError::from(err);
            tracing::warn!(request_id = %request_id, model = %model, error = %err.message, "Cannot serve model");
            metrics::record_request(&model, err.status.as_u16(), start_time.elapsed());
            return err.into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = match handle.url_for(path_and_query).parse() {
        Ok(uri) => uri,
        Err(e) => {
            return ApiError::upstream(format!("invalid backend address: {}", e)).into_response()
        }
    };

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (k, v) in parts.headers.iter() {
            if k != header::HOST && k != header::CONTENT_LENGTH {
                headers.insert(k.clone(), v.clone());
            }
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(X_REQUEST_ID, value);
        }
    }
    let upstream_request = match builder.body(Body::from(body_bytes)) {
        Ok(req) => req,
        Err(e) => return ApiError::upstream(e.to_string()).into_response(),
    };

    match state.client.request(upstream_request).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&model, status.as_u16(), start_time.elapsed());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                model = %model,
                backend = %handle.base_url,
                error = %e,
                "Upstream error"
            );
            metrics::record_request(&model, 502, start_time.elapsed());
            ApiError::upstream(format!("upstream request failed: {}", e)).into_response()
        }
    }
}
