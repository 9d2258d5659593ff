//! Transport-neutral request and response values.

use std::collections::HashMap;

use serde_json::Value;

use crate::endpoints::HttpMethod;
use crate::handlers::ExecutionError;

/// The parts of an incoming request a behavior may use.
///
/// Headers are deliberately absent: nothing a template renders can leak them.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
    pub request_id: String,
}

impl EndpointRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: Vec::new(),
            request_id: String::new(),
        }
    }

    /// Parse the body as JSON. An empty body is `None`; anything else must parse.
    pub fn json_body(&self) -> Result<Option<Value>, ExecutionError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&self.body)
            .map(Some)
            .map_err(|e| ExecutionError::BadRequest(format!("request body is not valid JSON: {e}")))
    }
}

/// What a behavior produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl EndpointResponse {
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
