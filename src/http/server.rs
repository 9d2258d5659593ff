//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with built-in and declared endpoints
//! - Wire up middleware (request ID, tracing, timeout, CORS)
//! - Bind server to listener
//! - Match the route before reading the body, then dispatch to the engine
//! - Apply route tables delivered by the endpoint watcher
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::ServiceConfig;
use crate::endpoints::HttpMethod;
use crate::engine::Engine;
use crate::http::request::{self, UuidRequestId, X_REQUEST_ID};
use crate::http::response::{endpoint_response, ApiError};
use crate::observability::metrics;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<ServiceConfig>,
}

/// HTTP facade over the engine.
pub struct HttpServer {
    router: Router,
    engine: Arc<Engine>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig, engine: Arc<Engine>) -> Self {
        let state = AppState {
            engine: Arc::clone(&engine),
            config: Arc::new(config),
        };
        let router = Self::build_router(state);
        Self { router, engine }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = Arc::clone(&state.config);

        let mut router = Router::new()
            .route("/_engine/health", get(admin::handlers::health))
            .merge(admin::admin_router(&state))
            .fallback(dispatch_handler)
            .with_state(state);

        if config.cors.enabled {
            router = router.layer(CorsLayer::permissive());
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            path = %req.uri().path(),
                            request_id = %request::request_id(req),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Route tables received on `route_updates` replace the active table.
    pub async fn run(
        self,
        listener: TcpListener,
        mut route_updates: mpsc::UnboundedReceiver<RouteTable>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let engine = Arc::clone(&self.engine);
        let updater = tokio::spawn(async move {
            while let Some(table) = route_updates.recv().await {
                engine.swap_routes(table);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        updater.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Handler for every path not claimed by a built-in route.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request::request_id(&request);
    let method_name = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let (route, result) = dispatch(&state, request, &request_id).await;
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            if err.status.is_server_error() {
                tracing::error!(kind = ?err.kind, error = %err.message, "Request failed");
            } else {
                tracing::debug!(kind = ?err.kind, error = %err.message, "Request rejected");
            }
            err.with_request_id(request_id).into_response()
        }
    };

    let route = route.unwrap_or_else(|| "unmatched".to_string());
    metrics::record_request(&method_name, response.status().as_u16(), &route, start);
    tracing::debug!(
        method = %method_name,
        path = %path,
        route = %route,
        status = response.status().as_u16(),
        "Request handled"
    );
    response
}

async fn dispatch(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> (Option<String>, Result<Response, ApiError>) {
    let engine = &state.engine;
    let path = request.uri().path().to_string();

    let Some(method) = HttpMethod::from_request(request.method().as_str()) else {
        let err = engine.unsupported_method(request.method().as_str(), &path);
        return (None, Err(err.into()));
    };

    // the body is only read once an endpoint claims the request
    let matched = match engine.resolve(method, &path) {
        Ok(matched) => matched,
        Err(e) => return (None, Err(e.into())),
    };
    let route = matched.definition.path.as_str().to_string();

    let max_body_size = state.config.limits.max_body_size;
    let endpoint_request = match request::extract(request, method, request_id, max_body_size).await
    {
        Ok(r) => r,
        Err(e) => return (Some(route), Err(e)),
    };

    match engine.execute(&matched, &endpoint_request).await {
        Ok(dispatched) => (Some(dispatched.route), endpoint_response(dispatched.response)),
        Err(err) => (Some(route), Err(err.into())),
    }
}
