//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Enforce the body size limit
//! - Convert an HTTP request into an [`EndpointRequest`]
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Content-Length checked before the body is read
//! - Headers stop here; endpoint behaviors never see them

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::Query,
    http::{header, HeaderName, HeaderValue, Request},
};
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::endpoints::HttpMethod;
use crate::handlers::EndpointRequest;
use crate::http::response::ApiError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request IDs as UUID v4 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// The request ID set by the request-id layer.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Read the whole request into an [`EndpointRequest`].
///
/// `method` must already be one endpoints can be declared for.
pub async fn extract(
    request: Request<Body>,
    method: HttpMethod,
    request_id: &str,
    max_body_size: usize,
) -> Result<EndpointRequest, ApiError> {
    let (parts, body) = request.into_parts();

    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if matches!(declared_len, Some(len) if len > max_body_size) {
        return Err(ApiError::payload_too_large(max_body_size));
    }

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .map_err(|e| ApiError::bad_request(format!("invalid query string: {e}")))?;

    // A chunked body over the limit is the only read failure we expect.
    let body = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|_| ApiError::payload_too_large(max_body_size))?;

    Ok(EndpointRequest {
        method,
        path: parts.uri.path().to_string(),
        query,
        body: body.to_vec(),
        request_id: request_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ErrorKind;

    #[tokio::test]
    async fn test_extracts_path_query_and_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/hello/Ada%20L?greeting=hi&x=1")
            .body(Body::from("{\"a\":1}"))
            .unwrap();

        let extracted = extract(request, HttpMethod::Post, "req-1", 1024).await.unwrap();
        assert_eq!(extracted.path, "/hello/Ada%20L");
        assert_eq!(extracted.query["greeting"], "hi");
        assert_eq!(extracted.body, b"{\"a\":1}");
        assert_eq!(extracted.request_id, "req-1");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();

        let err = extract(request, HttpMethod::Post, "req-2", 16).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PayloadTooLarge);
    }

    #[tokio::test]
    async fn test_declared_length_checked_first() {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_LENGTH, "1000000")
            .body(Body::empty())
            .unwrap();

        let err = extract(request, HttpMethod::Post, "req-3", 16).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PayloadTooLarge);
    }
}
