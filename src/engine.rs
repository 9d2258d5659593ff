//! The running endpoint engine.
//!
//! # Responsibilities
//! - Hold the active route table and swap it on reload
//! - Match a request and hand it to the executor
//! - Report status for the health endpoint
//!
//! # Design Decisions
//! - The table sits behind `ArcSwap`: requests never block a reload and a
//!   request always sees one complete table
//! - A failed reload leaves the active table in place

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;

use crate::endpoints::{self, LoadError};
use crate::handlers::{EndpointRequest, EndpointResponse, ExecutionError, Executor};
use crate::observability::metrics;
use crate::endpoints::HttpMethod;
use crate::routing::{MatchError, RouteMatch, RouteTable};
use crate::snapshot::record::unix_now;
use crate::snapshot::SnapshotStore;

/// A request that could not be answered by an endpoint.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("{source}")]
    Execution {
        /// Pattern of the matched route.
        route: String,
        #[source]
        source: ExecutionError,
    },
}

impl EngineError {
    pub fn route(&self) -> Option<&str> {
        match self {
            EngineError::Match(_) => None,
            EngineError::Execution { route, .. } => Some(route),
        }
    }
}

/// A successfully answered request.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Pattern of the matched route.
    pub route: String,
    pub response: EndpointResponse,
}

/// Point-in-time view for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub routes: usize,
    pub snapshots: usize,
    pub started_at: u64,
    /// Unix seconds of the last successful reload, if any.
    pub last_reload: Option<u64>,
    pub reloads: u64,
}

#[derive(Debug)]
pub struct Engine {
    routes: ArcSwap<RouteTable>,
    executor: Executor,
    started_at: u64,
    reloads: AtomicU64,
    last_reload: AtomicU64,
}

impl Engine {
    pub fn new(table: RouteTable, executor: Executor) -> Self {
        metrics::record_route_count(table.len());
        Self {
            routes: ArcSwap::from_pointee(table),
            executor,
            started_at: unix_now(),
            reloads: AtomicU64::new(0),
            last_reload: AtomicU64::new(0),
        }
    }

    /// The active table.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        self.executor.snapshots()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Replace the active table. Returns the new route count.
    pub fn swap_routes(&self, table: RouteTable) -> usize {
        let count = table.len();
        self.routes.store(Arc::new(table));
        self.reloads.fetch_add(1, Ordering::Relaxed);
        self.last_reload.store(unix_now(), Ordering::Relaxed);
        metrics::record_route_count(count);
        metrics::record_reload(true);
        tracing::info!(routes = count, "Route table swapped");
        count
    }

    /// Load `path` and swap it in. On failure the active table is kept.
    pub fn reload_from(&self, path: &Path) -> Result<usize, LoadError> {
        match endpoints::load_file(path) {
            Ok(table) => Ok(self.swap_routes(table)),
            Err(e) => {
                metrics::record_reload(false);
                tracing::error!(path = ?path, error = %e, "Reload failed, keeping current routes");
                Err(e)
            }
        }
    }

    /// Find the endpoint for a method and raw path in the active table.
    ///
    /// The match keeps its definition alive across a concurrent reload.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> Result<RouteMatch, MatchError> {
        self.routes.load().match_route(method, path)
    }

    /// Run a resolved endpoint.
    pub async fn execute(
        &self,
        matched: &RouteMatch,
        request: &EndpointRequest,
    ) -> Result<Dispatched, EngineError> {
        let route = matched.definition.path.as_str().to_string();
        match self.executor.execute(matched, request).await {
            Ok(response) => Ok(Dispatched { route, response }),
            Err(source) => Err(EngineError::Execution { route, source }),
        }
    }

    /// Answer a request with a declared method.
    pub async fn dispatch(&self, request: &EndpointRequest) -> Result<Dispatched, EngineError> {
        let matched = self.resolve(request.method, &request.path)?;
        self.execute(&matched, request).await
    }

    /// The failure for a method no endpoint can ever be declared with.
    pub fn unsupported_method(&self, method: &str, path: &str) -> MatchError {
        let allowed = self.routes.load().allowed_methods(path);
        if allowed.is_empty() {
            MatchError::NotFound {
                path: path.to_string(),
            }
        } else {
            MatchError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
                allowed,
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        let last_reload = match self.last_reload.load(Ordering::Relaxed) {
            0 => None,
            at => Some(at),
        };
        EngineStatus {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            routes: self.routes.load().len(),
            snapshots: self.snapshots().len(),
            started_at: self.started_at,
            last_reload,
            reloads: self.reloads.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PersistenceMode, RenderConfig};
    use crate::endpoints::load;
    use crate::render::ImageRenderer;

    fn engine(dir: &Path, yaml: &str) -> Engine {
        let executor = Executor::new(
            SnapshotStore::new(dir, PersistenceMode::WriteThrough),
            ImageRenderer::new(&RenderConfig::default()),
        );
        Engine::new(load(yaml).unwrap(), executor)
    }

    #[tokio::test]
    async fn test_dispatch_reports_route_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            dir.path(),
            r#"
- { method: GET, path: "/hello/{name}", response: { type: template, template: "Hello, {name}!" } }
"#,
        );

        let request = EndpointRequest::new(HttpMethod::Get, "/hello/Ada");
        let dispatched = engine.dispatch(&request).await.unwrap();
        assert_eq!(dispatched.route, "/hello/{name}");
        assert_eq!(dispatched.response.text(), Some("Hello, Ada!"));

        let missing = EndpointRequest::new(HttpMethod::Get, "/nope");
        assert!(matches!(
            engine.dispatch(&missing).await,
            Err(EngineError::Match(MatchError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_table() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            dir.path(),
            "- { method: GET, path: /a, response: { type: static, body: a } }\n",
        );
        let file = dir.path().join("endpoints.yaml");

        std::fs::write(&file, "- { method: GET, response: { type: static } }\n").unwrap();
        assert!(engine.reload_from(&file).is_err());
        assert_eq!(engine.routes().len(), 1);
        assert_eq!(engine.status().reloads, 0);
        assert_eq!(engine.status().last_reload, None);

        std::fs::write(
            &file,
            "- { method: GET, path: /a, response: { type: static, body: a } }\n\
             - { method: GET, path: /b, response: { type: static, body: b } }\n",
        )
        .unwrap();
        assert_eq!(engine.reload_from(&file).unwrap(), 2);
        assert_eq!(engine.status().reloads, 1);
        assert!(engine.status().last_reload.is_some());
    }

    #[test]
    fn test_unsupported_method() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            dir.path(),
            "- { method: GET, path: /a, response: { type: static, body: a } }\n",
        );
        assert!(matches!(
            engine.unsupported_method("OPTIONS", "/a"),
            MatchError::MethodNotAllowed { allowed, .. } if allowed == vec![HttpMethod::Get]
        ));
        assert!(matches!(
            engine.unsupported_method("OPTIONS", "/b"),
            MatchError::NotFound { .. }
        ));
    }
}
