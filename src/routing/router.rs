//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled endpoint definitions
//! - Look up the definition matching a method and path
//! - Return the match with bound parameters, or an explicit failure
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Request segments are percent-decoded once, before any comparison
//! - O(1) lookup for fully literal paths via HashMap
//! - Parameterized routes bucketed by segment count and pre-sorted by
//!   literal count then declaration order, so the first hit wins
//! - Explicit NotFound / MethodNotAllowed rather than a silent default

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::endpoints::definition::{EndpointDefinition, HttpMethod, RouteSummary};
use crate::routing::matcher::decode_path;

/// Result of matching a request against the table.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub definition: Arc<EndpointDefinition>,
    /// Path parameter bindings, percent-decoded.
    pub params: HashMap<String, String>,
}

/// Why a request did not match any route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("no endpoint is declared for path {path}")]
    NotFound { path: String },

    #[error("{method} is not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed: Vec<HttpMethod>,
    },

    #[error("path segment '{segment}' is not valid percent-encoded UTF-8")]
    MalformedPath { segment: String },
}

/// Immutable routing table built from validated definitions.
#[derive(Debug, Default)]
pub struct RouteTable {
    /// Declaration order.
    routes: Vec<Arc<EndpointDefinition>>,
    /// Fully literal paths by decoded segments.
    literal: HashMap<Vec<String>, Vec<Arc<EndpointDefinition>>>,
    /// Every route by segment count, in match priority order.
    by_depth: HashMap<usize, Vec<Arc<EndpointDefinition>>>,
}

impl RouteTable {
    /// Build a table. Definitions are expected to be validated and unique.
    pub fn build(definitions: Vec<EndpointDefinition>) -> Self {
        let mut routes: Vec<Arc<EndpointDefinition>> =
            definitions.into_iter().map(Arc::new).collect();
        routes.sort_by_key(|d| d.index);

        let mut literal: HashMap<Vec<String>, Vec<Arc<EndpointDefinition>>> = HashMap::new();
        let mut by_depth: HashMap<usize, Vec<Arc<EndpointDefinition>>> = HashMap::new();

        for route in &routes {
            if let Some(key) = route.path.literal_key() {
                literal.entry(key).or_default().push(Arc::clone(route));
            }
            by_depth
                .entry(route.path.segments().len())
                .or_default()
                .push(Arc::clone(route));
        }

        for bucket in by_depth.values_mut() {
            // stable: equal literal counts keep declaration order
            bucket.sort_by(|a, b| b.path.literal_count().cmp(&a.path.literal_count()));
        }

        Self {
            routes,
            literal,
            by_depth,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Definitions in declaration order.
    pub fn routes(&self) -> &[Arc<EndpointDefinition>] {
        &self.routes
    }

    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.routes.iter().map(|r| r.summary()).collect()
    }

    /// Match a request method and raw (still percent-encoded) path.
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Result<RouteMatch, MatchError> {
        let segments =
            decode_path(path).map_err(|segment| MatchError::MalformedPath { segment })?;

        if let Some(candidates) = self.literal.get(&segments) {
            if let Some(definition) = candidates.iter().find(|d| d.method == method) {
                return Ok(RouteMatch {
                    definition: Arc::clone(definition),
                    params: HashMap::new(),
                });
            }
        }

        let mut allowed = Vec::new();

        for definition in self.by_depth.get(&segments.len()).into_iter().flatten() {
            let Some(bindings) = definition.path.match_segments(&segments) else {
                continue;
            };
            if definition.method != method {
                if !allowed.contains(&definition.method) {
                    allowed.push(definition.method);
                }
                continue;
            }

            let params = bindings
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            return Ok(RouteMatch {
                definition: Arc::clone(definition),
                params,
            });
        }

        if allowed.is_empty() {
            Err(MatchError::NotFound {
                path: path.to_string(),
            })
        } else {
            allowed.sort();
            Err(MatchError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
                allowed,
            })
        }
    }

    /// Methods declared for any pattern matching `path`.
    pub fn allowed_methods(&self, path: &str) -> Vec<HttpMethod> {
        let Ok(segments) = decode_path(path) else {
            return Vec::new();
        };
        let mut allowed: Vec<HttpMethod> = self
            .by_depth
            .get(&segments.len())
            .into_iter()
            .flatten()
            .filter(|d| d.path.match_segments(&segments).is_some())
            .map(|d| d.method)
            .collect();
        allowed.sort();
        allowed.dedup();
        allowed
    }
}
