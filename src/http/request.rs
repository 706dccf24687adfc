//! Request identification and model extraction.
//!
//! # Responsibilities
//! - Name the request-id header shared by the middleware and the proxy
//! - Find the target model of an inference request (JSON body or query)
//!
//! # Design Decisions
//! - The body is buffered once (bounded by the listener body limit) so the
//!   model can be read and the same bytes forwarded upstream
//! - A body that is not JSON is not an error by itself; only a missing model is

use axum::http::{HeaderMap, HeaderName, Uri};
use serde_json::Value;
use url::form_urlencoded;

/// Header carrying the request id end to end.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id set by the middleware, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Model named by an inference request: JSON body `model` first, then `?model=`.
pub fn requested_model(uri: &Uri, body: &[u8]) -> Option<String> {
    if !body.is_empty() {
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
            if let Some(Value::String(model)) = map.get("model") {
                if !model.is_empty() {
                    return Some(model.clone());
                }
            }
        }
    }

    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "model")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_body() {
        let uri: Uri = "/v1/chat/completions".parse().unwrap();
        let body = br#"{"model":"llama","messages":[]}"#;
        assert_eq!(requested_model(&uri, body), Some("llama".into()));
    }

    #[test]
    fn test_model_from_query() {
        let uri: Uri = "/v1/props?foo=1&model=qwen".parse().unwrap();
        assert_eq!(requested_model(&uri, b""), Some("qwen".into()));
        // Body wins over the query.
        assert_eq!(
            requested_model(&uri, br#"{"model":"llama"}"#),
            Some("llama".into())
        );
    }

    #[test]
    fn test_query_model_is_percent_decoded() {
        let uri: Uri = "/v1/props?model=org%2Fqwen+7b".parse().unwrap();
        assert_eq!(requested_model(&uri, b""), Some("org/qwen 7b".into()));

        let uri: Uri = "/v1/props?model=".parse().unwrap();
        assert_eq!(requested_model(&uri, b""), None);
    }

    #[test]
    fn test_missing_model() {
        let uri: Uri = "/v1/chat/completions".parse().unwrap();
        assert_eq!(requested_model(&uri, b"not json"), None);
        assert_eq!(requested_model(&uri, br#"{"model":""}"#), None);
        assert_eq!(requested_model(&uri, br#"{"model":3}"#), None);
    }

    #[test]
    fn test_request_id_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(X_REQUEST_ID, "abc".parse().unwrap());
        assert_eq!(request_id(&headers), "abc");
    }
}
