//! Declarative endpoint definitions.
//!
//! # Data Flow
//! ```text
//! endpoints.yaml
//!     → loader.rs (YAML → document)
//!     → schema.rs (raw per-entry structures)
//!     → validation.rs (semantic checks, templates, duplicates)
//!     → Vec<EndpointDefinition> (validated, immutable)
//!     → routing::RouteTable::build
//! ```
//!
//! # Design Decisions
//! - Two phases: parse-and-validate reports every failure, build cannot fail
//! - Behaviors are a closed enum; adding one is an exhaustive-match change
//! - A file with any invalid entry produces no table at all

pub mod definition;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validation;

pub use definition::{
    Behavior, EndpointDefinition, HttpMethod, ImageBehavior, Mutation, Rgba, RouteSummary,
    StatefulBehavior,
};
pub use loader::{load, load_file, parse_definitions, LoadError};
pub use template::{Template, TemplateError, TemplateScope};
pub use validation::EntryError;
