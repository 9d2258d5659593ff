//! HTTP facade.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout, CORS)
//!     → /_engine/* built-ins (admin module)
//!     → otherwise request.rs (method, query, body limit → EndpointRequest)
//!     → Engine::dispatch
//!     → response.rs (EndpointResponse or JSON error body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::{ApiError, ErrorKind};
pub use server::{AppState, HttpServer};
