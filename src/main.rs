//! Declarative Endpoint Engine
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌───────────────────────────────────────────────────────────┐
//!                  │                      ENDPOINT ENGINE                      │
//!                  │                                                           │
//!  Client Request  │  ┌─────────┐    ┌──────────┐    ┌──────────┐              │
//!  ────────────────┼─▶│  http   │───▶│ routing  │───▶│ handlers │              │
//!                  │  │ server  │    │  table   │    │ executor │              │
//!                  │  └─────────┘    └────▲─────┘    └──┬────┬──┘              │
//!                  │                      │             │    │                 │
//!                  │               ┌──────┴─────┐ ┌─────▼┐ ┌─▼────────┐        │
//!                  │               │ endpoints  │ │render│ │ snapshot │──▶ disk│
//!                  │               │ YAML loader│ │ PNG  │ │  store   │        │
//!                  │               └────────────┘ └──────┘ └──────────┘        │
//!                  │                                                           │
//!                  │  Cross-cutting: config, observability, lifecycle, admin   │
//!                  └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use endpoint_engine::config::loader::{apply_port_override, load_config};
use endpoint_engine::config::validation::validate_config;
use endpoint_engine::config::ConfigError;
use endpoint_engine::lifecycle::{signals, startup, Shutdown};
use endpoint_engine::observability::logging;

#[derive(Parser)]
#[command(name = "endpoint-engine")]
#[command(about = "Serve HTTP endpoints declared in a YAML file", long_about = None)]
struct Args {
    /// Service configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint definitions file.
    #[arg(short, long)]
    endpoints: Option<PathBuf>,

    /// Directory for persisted snapshots.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Listener port; wins over the config file and PORT.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(endpoints) = args.endpoints {
        config.endpoints.path = endpoints;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(port) = args.port {
        apply_port_override(&mut config, port);
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "endpoint-engine starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoints = ?config.endpoints.path,
        data_dir = ?config.storage.data_dir,
        persistence = ?config.storage.persistence,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    startup::run(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
