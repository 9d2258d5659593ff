//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (endpoint watcher, snapshot flusher, metrics)
//! - Bind the listener and begin accepting traffic
//! - Flush snapshot state once the server has stopped
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Endpoints and snapshots load before the listener binds (traffic only
//!   when ready)
//! - Corrupt snapshot files stop startup instead of being overwritten

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::{ConfigError, EndpointWatcher, ServiceConfig};
use crate::endpoints::{self, LoadError};
use crate::engine::Engine;
use crate::handlers::Executor;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::render::ImageRenderer;
use crate::snapshot::{PersistenceError, SnapshotStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load endpoints from {path}: {source}")]
    Endpoints {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("failed to restore snapshots: {0}")]
    Snapshots(#[from] PersistenceError),

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to watch endpoint file: {0}")]
    Watcher(#[from] notify::Error),

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Load endpoints and snapshot state and assemble the engine.
pub async fn build_engine(config: &ServiceConfig) -> Result<Arc<Engine>, StartupError> {
    let path = &config.endpoints.path;
    let table = endpoints::load_file(path).map_err(|source| StartupError::Endpoints {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = ?path, routes = table.len(), "Endpoints loaded");

    let store = SnapshotStore::new(&config.storage.data_dir, config.storage.persistence);
    store.load_all().await?;

    let renderer = ImageRenderer::new(&config.render);
    Ok(Arc::new(Engine::new(table, Executor::new(store, renderer))))
}

/// Bind the configured address and serve until `shutdown` fires.
pub async fn run(config: ServiceConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;
    serve(config, listener, shutdown).await
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve(
    config: ServiceConfig,
    listener: TcpListener,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::Address(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let engine = build_engine(&config).await?;

    let (updates, _watcher) = if config.endpoints.watch {
        let (watcher, updates) = EndpointWatcher::new(&config.endpoints.path);
        (updates, Some(watcher.run()?))
    } else {
        let (_tx, updates) = mpsc::unbounded_channel();
        (updates, None)
    };

    let flusher = engine.snapshots().spawn_flusher(shutdown.subscribe());

    let server = HttpServer::new(config, Arc::clone(&engine));
    let result = server.run(listener, updates, shutdown.subscribe()).await;

    // Stop the flusher even when the server ended on its own.
    shutdown.trigger();
    if let Some(flusher) = flusher {
        let _ = flusher.await;
    }
    match engine.snapshots().flush().await {
        Ok(0) => {}
        Ok(written) => tracing::info!(records = written, "Snapshots flushed on shutdown"),
        Err(e) => tracing::error!(error = %e, "Final snapshot flush failed"),
    }

    result.map_err(StartupError::Server)
}
