//! Snapshot storage and persistence.
//!
//! # Responsibilities
//! - Own every snapshot record; handlers only see copies
//! - Serialize read-modify-write per key
//! - Persist records under `<data_dir>/snaps/<key>.json`
//! - Restore all records once at startup
//!
//! # Design Decisions
//! - One async mutex per key inside a DashMap: same-key mutations are
//!   linearizable, different keys never wait on each other
//! - Mutations run on a working copy; the record is replaced only after the
//!   mutation succeeded and (in write-through mode) the file was written
//! - Files are written to a temporary name, synced, then renamed
//! - Corrupt files fail startup loudly; a missing directory is just empty state

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::schema::PersistenceMode;
use crate::observability::metrics;
use crate::snapshot::is_valid_key;
use crate::snapshot::record::SnapshotRecord;

/// Failure to read or write durable snapshot state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("failed to encode snapshot '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of a snapshot read or mutation.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid snapshot key '{0}'")]
    InvalidKey(String),

    #[error("snapshot '{key}' field '{field}' holds {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("incrementing snapshot '{key}' field '{field}' overflowed")]
    Overflow { key: String, field: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

struct Slot {
    record: Mutex<SnapshotRecord>,
    /// Holds at least one committed mutation (or was loaded from disk).
    committed: AtomicBool,
    /// Committed but not yet written (debounce mode).
    dirty: AtomicBool,
}

impl Slot {
    fn new(record: SnapshotRecord) -> Self {
        let committed = !record.is_new();
        Self {
            record: Mutex::new(record),
            committed: AtomicBool::new(committed),
            dirty: AtomicBool::new(false),
        }
    }
}

struct StoreInner {
    dir: PathBuf,
    mode: PersistenceMode,
    slots: DashMap<String, Arc<Slot>>,
}

/// Shared handle to the snapshot store.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("dir", &self.inner.dir)
            .field("mode", &self.inner.mode)
            .field("records", &self.inner.slots.len())
            .finish()
    }
}

impl SnapshotStore {
    /// Create a store rooted at `data_dir`. Nothing is read until [`load_all`](Self::load_all).
    pub fn new(data_dir: impl AsRef<Path>, mode: PersistenceMode) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                dir: data_dir.as_ref().join("snaps"),
                mode,
                slots: DashMap::new(),
            }),
        }
    }

    /// Directory holding the per-key files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn mode(&self) -> PersistenceMode {
        self.inner.mode
    }

    /// Populate memory from disk. Returns the number of records loaded.
    pub async fn load_all(&self) -> Result<usize, PersistenceError> {
        let dir = &self.inner.dir;
        tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error(dir))?;
        let mut loaded = 0;

        while let Some(entry) = entries.next_entry().await.map_err(io_error(dir))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = ?path, "Skipping snapshot file with non UTF-8 name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(key) = name.strip_suffix(".json") else {
                continue;
            };

            let bytes = tokio::fs::read(&path).await.map_err(io_error(&path))?;
            let record: SnapshotRecord =
                serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                })?;

            if !is_valid_key(key) || record.key != key {
                return Err(PersistenceError::Corrupt {
                    path,
                    message: format!("stored key '{}' does not match file name", record.key),
                });
            }

            self.inner
                .slots
                .insert(key.to_string(), Arc::new(Slot::new(record)));
            loaded += 1;
        }

        metrics::record_snapshot_count(self.len());
        tracing::info!(dir = ?dir, records = loaded, "Snapshots loaded");
        Ok(loaded)
    }

    /// Current record for `key`; an unknown key yields an empty record.
    pub async fn get(&self, key: &str) -> Result<SnapshotRecord, SnapshotError> {
        check_key(key)?;
        let slot = self.inner.slots.get(key).map(|entry| Arc::clone(entry.value()));
        match slot {
            Some(slot) => Ok(slot.record.lock().await.clone()),
            None => Ok(SnapshotRecord::empty(key)),
        }
    }

    /// Apply `f` to the record under exclusive access and commit the result.
    ///
    /// In write-through mode the new record is on disk before this returns.
    /// If `f` or the write fails, the stored record is unchanged.
    pub async fn mutate<F>(&self, key: &str, f: F) -> Result<SnapshotRecord, SnapshotError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) -> Result<(), SnapshotError>,
    {
        check_key(key)?;
        let slot = self.slot(key);
        let mut record = slot.record.lock().await;

        let mut working = record.data.clone();
        f(&mut working)?;
        let next = record.next(working);

        match self.inner.mode {
            PersistenceMode::WriteThrough => self.persist(&next).await?,
            PersistenceMode::Debounce { .. } => slot.dirty.store(true, Ordering::Release),
        }

        *record = next.clone();
        if !slot.committed.swap(true, Ordering::AcqRel) {
            metrics::record_snapshot_count(self.len());
        }

        tracing::debug!(key = %key, version = next.version, "Snapshot committed");
        Ok(next)
    }

    /// Write every record with unflushed mutations.
    pub async fn flush(&self) -> Result<usize, PersistenceError> {
        let dirty: Vec<Arc<Slot>> = self
            .inner
            .slots
            .iter()
            .filter(|entry| entry.value().dirty.load(Ordering::Acquire))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut written = 0;
        for slot in dirty {
            if !slot.dirty.swap(false, Ordering::AcqRel) {
                continue;
            }
            let record = slot.record.lock().await;
            if let Err(e) = self.persist(&record).await {
                slot.dirty.store(true, Ordering::Release);
                return Err(e);
            }
            written += 1;
        }

        if written > 0 {
            tracing::debug!(records = written, "Snapshots flushed");
        }
        Ok(written)
    }

    /// Start the periodic flusher when running in debounce mode.
    pub fn spawn_flusher(&self, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        let PersistenceMode::Debounce { interval_ms } = self.inner.mode else {
            return None;
        };
        let store = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            tracing::error!(error = %e, "Periodic snapshot flush failed");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        }))
    }

    /// Keys holding committed state, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .slots
            .iter()
            .filter(|entry| entry.value().committed.load(Ordering::Acquire))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|entry| entry.value().committed.load(Ordering::Acquire))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        let entry = self
            .inner
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Slot::new(SnapshotRecord::empty(key))));
        Arc::clone(entry.value())
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.inner.dir.join(format!("{key}.json"))
    }

    async fn persist(&self, record: &SnapshotRecord) -> Result<(), PersistenceError> {
        let result = self.write_record(record).await;
        metrics::record_snapshot_write(result.is_ok());
        if let Err(e) = &result {
            tracing::error!(key = %record.key, error = %e, "Snapshot write failed");
        }
        result
    }

    async fn write_record(&self, record: &SnapshotRecord) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec_pretty(record).map_err(|source| PersistenceError::Encode {
            key: record.key.clone(),
            source,
        })?;

        let dir = &self.inner.dir;
        let path = self.record_path(&record.key);
        let tmp = dir.join(format!(".{}.json.tmp", record.key));

        tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_error(&tmp))?;
        file.write_all(&encoded).await.map_err(io_error(&tmp))?;
        file.sync_all().await.map_err(io_error(&tmp))?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await.map_err(io_error(&path))?;
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), SnapshotError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(SnapshotError::InvalidKey(key.to_string()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn increment(data: &mut BTreeMap<String, Value>) -> Result<(), SnapshotError> {
        let current = data.get("value").and_then(Value::as_i64).unwrap_or(0);
        data.insert("value".to_string(), json!(current + 1));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_unknown_key_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);

        let record = store.get("nothing-here").await.unwrap();
        assert_eq!(record, SnapshotRecord::empty("nothing-here"));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_mutate_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        store.load_all().await.unwrap();

        let record = store.mutate("counter", increment).await.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.data["value"], json!(1));

        let on_disk: SnapshotRecord =
            serde_json::from_slice(&std::fs::read(dir.path().join("snaps/counter.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk, record);
        assert_eq!(store.keys(), vec!["counter".to_string()]);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
            store.load_all().await.unwrap();
            store.mutate("counter", increment).await.unwrap();
            store.mutate("counter", increment).await.unwrap();
        }

        let reopened = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        assert_eq!(reopened.load_all().await.unwrap(), 1);
        let record = reopened.get("counter").await.unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.data["value"], json!(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        store.load_all().await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.mutate("hits", increment).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let record = store.get("hits").await.unwrap();
        assert_eq!(record.data["value"], json!(50));
        assert_eq!(record.version, 50);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_record_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        store.mutate("k", increment).await.unwrap();

        let err = store
            .mutate("k", |data| {
                data.insert("value".into(), json!("garbage"));
                Err(SnapshotError::Overflow {
                    key: "k".into(),
                    field: "value".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Overflow { .. }));

        let record = store.get("k").await.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.data["value"], json!(1));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_and_not_committed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = SnapshotStore::new(&blocker, PersistenceMode::WriteThrough);
        let err = store.mutate("k", increment).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Persistence(PersistenceError::Io { .. })));

        let record = store.get("k").await.unwrap();
        assert!(record.is_new());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_absent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("fresh/volume");
        let store = SnapshotStore::new(&data_dir, PersistenceMode::WriteThrough);

        assert_eq!(store.load_all().await.unwrap(), 0);
        assert!(data_dir.join("snaps").is_dir());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("snaps")).unwrap();
        std::fs::write(dir.path().join("snaps/broken.json"), b"{not json").unwrap();

        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        let err = store.load_all().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_mismatched_key_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("snaps")).unwrap();
        let record = SnapshotRecord::empty("other");
        std::fs::write(
            dir.path().join("snaps/mine.json"),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();

        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        assert!(matches!(
            store.load_all().await,
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_temporary_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("snaps")).unwrap();
        std::fs::write(dir.path().join("snaps/.counter.json.tmp"), b"partial").unwrap();
        std::fs::write(dir.path().join("snaps/README"), b"notes").unwrap();

        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        assert_eq!(store.load_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_debounce_defers_writes_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            SnapshotStore::new(dir.path(), PersistenceMode::Debounce { interval_ms: 60_000 });
        store.load_all().await.unwrap();

        store.mutate("lazy", increment).await.unwrap();
        let path = dir.path().join("snaps/lazy.json");
        assert!(!path.exists());

        assert_eq!(store.flush().await.unwrap(), 1);
        assert!(path.exists());
        assert_eq!(store.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flusher_writes_on_its_timer() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::Debounce { interval_ms: 20 });
        store.load_all().await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let flusher = store.spawn_flusher(shutdown_rx).unwrap();

        store.mutate("ticked", increment).await.unwrap();
        let path = dir.path().join("snaps/ticked.json");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !path.exists() {
            assert!(tokio::time::Instant::now() < deadline, "flusher never wrote");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let on_disk: SnapshotRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.data["value"], json!(1));
        assert!(!flusher.is_finished());

        shutdown_tx.send(()).unwrap();
        flusher.await.unwrap();
    }

    #[test]
    fn test_write_through_has_no_flusher() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        let (_tx, rx) = broadcast::channel(1);
        assert!(store.spawn_flusher(rx).is_none());
    }

    #[tokio::test]
    async fn test_invalid_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        assert!(matches!(
            store.get("../escape").await,
            Err(SnapshotError::InvalidKey(_))
        ));
        assert!(matches!(
            store.mutate("a/b", increment).await,
            Err(SnapshotError::InvalidKey(_))
        ));
    }
}
