//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use endpoint_engine::config::ServiceConfig;
use endpoint_engine::lifecycle::{startup, Shutdown, StartupError};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ADMIN_KEY: &str = "test-admin-key";

/// A running engine on an ephemeral port.
pub struct TestEngine {
    pub addr: SocketAddr,
    pub dir: TempDir,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), StartupError>>,
}

impl TestEngine {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn endpoints_path(&self) -> std::path::PathBuf {
        self.dir.path().join("endpoints.yaml")
    }

    /// Stop the server and hand back its directory for a restart.
    pub async fn stop(self) -> TempDir {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
        self.dir
    }
}

pub fn test_config(dir: &TempDir) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.endpoints.path = dir.path().join("endpoints.yaml");
    config.endpoints.watch = false;
    config.storage.data_dir = dir.path().join("data");
    config.render.fonts_dir = dir.path().join("fonts");
    config.admin.api_key = Some(ADMIN_KEY.to_string());
    config
}

/// Start an engine serving `yaml` in a fresh temporary directory.
pub async fn start(yaml: &str) -> TestEngine {
    let dir = tempfile::tempdir().unwrap();
    start_in(dir, yaml, |_| {}).await
}

/// Start an engine in `dir`, writing `yaml` as its endpoint file.
pub async fn start_in<F>(dir: TempDir, yaml: &str, tweak: F) -> TestEngine
where
    F: FnOnce(&mut ServiceConfig),
{
    std::fs::write(dir.path().join("endpoints.yaml"), yaml).unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(startup::serve(config, listener, shutdown.clone()));

    let engine = TestEngine {
        addr,
        dir,
        client: reqwest::Client::new(),
        shutdown,
        handle,
    };
    wait_until_ready(&engine).await;
    engine
}

async fn wait_until_ready(engine: &TestEngine) {
    for _ in 0..100 {
        if let Ok(res) = engine.client.get(engine.url("/_engine/health")).send().await {
            if res.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("engine at {} never became ready", engine.addr);
}
