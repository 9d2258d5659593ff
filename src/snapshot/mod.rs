//! Durable snapshot state shared by stateful endpoints.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     <data_dir>/snaps/*.json → store.rs load_all → in-memory records
//!
//! Per stateful request:
//!     handlers::stateful → SnapshotStore::mutate(key, fn)
//!         → per-key lock → fn on working copy → write file → commit → unlock
//!
//! Shutdown:
//!     flush() writes anything still dirty (debounce mode)
//! ```

pub mod record;
pub mod store;

pub use record::SnapshotRecord;
pub use store::{PersistenceError, SnapshotError, SnapshotStore};

/// Longest accepted snapshot key.
pub const MAX_KEY_LEN: usize = 128;

/// Keys double as file names: ASCII letters, digits, `_`, `-`, `.`; no leading dot.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
