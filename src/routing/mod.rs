//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (decode segments, literal index, then depth bucket scan)
//!     → matcher.rs (segment comparison, parameter binding)
//!     → Return: RouteMatch, NotFound or MethodNotAllowed
//!
//! Route Compilation (at load and on reload):
//!     Vec<EndpointDefinition>
//!     → Index literal paths
//!     → Bucket by segment count, sort by literal count
//!     → Freeze as immutable RouteTable (swapped atomically on reload)
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, Segment};
pub use router::{MatchError, RouteMatch, RouteTable};

/// First path segment reserved for built-in routes.
pub const RESERVED_PREFIX: &str = "_engine";
