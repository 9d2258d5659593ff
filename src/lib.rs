//! Declarative endpoint engine.
//!
//! Serves HTTP endpoints described in a YAML file: fixed bodies, templated
//! text, rendered PNG images, and counters or lists kept in durable
//! snapshots.

// Definitions and matching
pub mod endpoints;
pub mod routing;

// Execution
pub mod engine;
pub mod handlers;
pub mod render;
pub mod snapshot;

// Service
pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use engine::Engine;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
