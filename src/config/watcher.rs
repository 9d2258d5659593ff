//! Endpoint file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::endpoints::load_file;
use crate::observability::metrics;
use crate::routing::RouteTable;

/// A watcher that monitors the endpoint file for changes.
pub struct EndpointWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RouteTable>,
}

impl EndpointWatcher {
    /// Create a new EndpointWatcher.
    ///
    /// Returns the watcher and a receiver for freshly loaded route tables.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RouteTable>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in a background thread. Drop the returned handle to stop.
    ///
    /// The parent directory is watched so editors that replace the file by
    /// rename are still seen.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !(relevant && ours) {
                        return;
                    }

                    tracing::info!(path = ?path, "Endpoint file change detected, reloading");
                    match load_file(&path) {
                        Ok(table) => {
                            let _ = tx.send(table);
                        }
                        Err(e) => {
                            metrics::record_reload(false);
                            tracing::error!(
                                error = %e,
                                "Failed to reload endpoints. Keeping current routes."
                            );
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let watched = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Endpoint watcher started");
        Ok(watcher)
    }
}
