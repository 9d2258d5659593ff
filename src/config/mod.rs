//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! engine.toml (optional)
//!     → loader.rs (parse & deserialize, PORT override)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On endpoint file change:
//!     watcher.rs detects change
//!     → endpoints::load_file builds a new RouteTable
//!     → sent over a channel to the server task
//!     → atomic swap inside the Engine
//! ```
//!
//! # Design Decisions
//! - Service config is immutable once loaded; only endpoints hot-reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, ListenerConfig, LogFormat, PersistenceMode, RenderConfig, ServiceConfig,
    StorageConfig,
};
pub use watcher::EndpointWatcher;
