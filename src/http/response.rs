//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn endpoint responses into HTTP responses
//! - Map every failure to a status code and a JSON error body
//!
//! # Design Decisions
//! - One error shape for every non-2xx response:
//!   `{"error": {"kind", "message", "request_id"}}`
//! - 405 responses carry an `Allow` header listing the declared methods

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::endpoints::HttpMethod;
use crate::engine::EngineError;
use crate::handlers::{EndpointResponse, ExecutionError};
use crate::routing::MatchError;
use crate::snapshot::SnapshotError;

/// The `kind` field of an error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    MethodNotAllowed,
    BadRequest,
    TemplateError,
    RenderError,
    SnapshotError,
    PersistenceError,
    PayloadTooLarge,
    InternalError,
    Unauthorized,
    LoadError,
}

/// An error on its way to the client.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: String,
    pub allow: Vec<HttpMethod>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: ErrorKind,
    message: &'a str,
    request_id: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            request_id: String::new(),
            allow: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::BadRequest, message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::PayloadTooLarge,
            format!("request body exceeds {limit} bytes"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        let message = err.to_string();
        match err {
            MatchError::NotFound { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, ErrorKind::NotFound, message)
            }
            MatchError::MethodNotAllowed { allowed, .. } => {
                let mut api = ApiError::new(
                    StatusCode::METHOD_NOT_ALLOWED,
                    ErrorKind::MethodNotAllowed,
                    message,
                );
                api.allow = allowed;
                api
            }
            MatchError::MalformedPath { .. } => ApiError::bad_request(message),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(err: SnapshotError) -> Self {
        let message = err.to_string();
        match err {
            SnapshotError::TypeMismatch { .. } | SnapshotError::Overflow { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, ErrorKind::SnapshotError, message)
            }
            SnapshotError::InvalidKey(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::SnapshotError, message)
            }
            SnapshotError::Persistence(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::PersistenceError,
                message,
            ),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Template(e) => {
                ApiError::new(StatusCode::BAD_REQUEST, ErrorKind::TemplateError, e.to_string())
            }
            ExecutionError::Render(e) => {
                let status = if e.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                ApiError::new(status, ErrorKind::RenderError, e.to_string())
            }
            ExecutionError::Snapshot(e) => e.into(),
            ExecutionError::BadRequest(message) => ApiError::bad_request(message),
            ExecutionError::Internal(message) => ApiError::internal(message),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Match(e) => e.into(),
            EngineError::Execution { source, .. } => source.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind,
                message: &self.message,
                request_id: &self.request_id,
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();

        if !self.allow.is_empty() {
            let allow = self
                .allow
                .iter()
                .map(HttpMethod::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
        response
    }
}

/// Build the HTTP response for a successful endpoint.
pub fn endpoint_response(response: EndpointResponse) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|_| ApiError::internal(format!("invalid status code {}", response.status)))?;
    let content_type = HeaderValue::from_str(&response.content_type).map_err(|_| {
        ApiError::internal(format!("invalid content type '{}'", response.content_type))
    })?;

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    http.headers_mut().insert(header::CONTENT_TYPE, content_type);
    Ok(http)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use crate::snapshot::PersistenceError;

    #[test]
    fn test_match_errors_map_to_status() {
        let not_found: ApiError = MatchError::NotFound { path: "/x".into() }.into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.kind, ErrorKind::NotFound);

        let not_allowed: ApiError = MatchError::MethodNotAllowed {
            method: "DELETE".into(),
            path: "/x".into(),
            allowed: vec![HttpMethod::Get, HttpMethod::Post],
        }
        .into();
        assert_eq!(not_allowed.status, StatusCode::METHOD_NOT_ALLOWED);
        let response = not_allowed.into_response();
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
    }

    #[test]
    fn test_render_errors_split_by_fault() {
        let font: ApiError = ExecutionError::Render(RenderError::FontUnavailable {
            font: "x.ttf".into(),
            reason: "missing".into(),
        })
        .into();
        assert_eq!(font.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(font.kind, ErrorKind::RenderError);

        let text: ApiError =
            ExecutionError::Render(RenderError::TextTooLong { len: 9, max: 3 }).into();
        assert_eq!(text.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_persistence_failure_is_its_own_kind() {
        let err: ApiError = ExecutionError::Snapshot(SnapshotError::Persistence(
            PersistenceError::Corrupt {
                path: "/data/snaps/a.json".into(),
                message: "bad".into(),
            },
        ))
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind, ErrorKind::PersistenceError);
    }

    #[test]
    fn test_invalid_declared_status_is_internal() {
        let err = endpoint_response(EndpointResponse {
            status: 1000,
            content_type: "text/plain".into(),
            body: Vec::new(),
        })
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }
}
