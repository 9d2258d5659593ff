//! Configuration schema definitions.
//!
//! This module defines the service configuration. All types derive Serde
//! traits for deserialization from a TOML file; every section has defaults so
//! the service runs without any file at all.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the endpoint engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where the endpoint definitions come from.
    pub endpoints: EndpointsConfig,

    /// Snapshot persistence.
    pub storage: StorageConfig,

    /// PNG rendering.
    pub render: RenderConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). The port may be overridden by `PORT`.
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Endpoint file settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Path to the YAML endpoint file.
    pub path: PathBuf,

    /// Reload the file when it changes on disk.
    pub watch: bool,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("endpoints.yaml"),
            watch: true,
        }
    }
}

/// When snapshot mutations reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Every mutation is written before it is acknowledged.
    #[default]
    WriteThrough,

    /// Mutations are flushed by a background task every `interval_ms`.
    Debounce { interval_ms: u64 },
}

/// Snapshot storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory mapped to the durable volume.
    pub data_dir: PathBuf,

    pub persistence: PersistenceMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            persistence: PersistenceMode::WriteThrough,
        }
    }
}

/// Image rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Directory relative font references are resolved against.
    pub fonts_dir: PathBuf,

    /// Largest canvas accepted by the renderer.
    pub max_width: u32,
    pub max_height: u32,

    /// Text length limit applied when an endpoint declares none.
    pub max_text_len: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fonts_dir: PathBuf::from("/usr/share/fonts/truetype/dejavu"),
            max_width: 4096,
            max_height: 4096,
            max_text_len: 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Cross-origin settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allow any origin, method and header.
    pub enabled: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token for `/_engine` admin routes. Admin routes are off when unset.
    pub api_key: Option<String>,
}
