//! Durable storage backend.
//!
//! A directory-backed [`StoryStore`](crate::storage::StoryStore) with:
//! - Write-ahead logging of every mutation for crash recovery
//! - File locking for single-process access
//! - CRC32 checksums for corruption detection
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   .lock      exclusive advisory lock
//!   lore.wal   header + one checksummed frame per mutation
//! ```
//!
//! A merge is logged as one record, so a crash mid-write replays as if the
//! merge never happened.

mod codec;
mod file_lock;
mod store;
mod wal;

pub use file_lock::FileLock;
pub use store::PersistentStoryStore;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoreResult;

/// Configuration for the durable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}

/// Open or create a durable story store at `path`.
///
/// # Errors
/// - If the directory cannot be created or accessed
/// - If another process holds the lock
/// - If the log header is unreadable or a logged mutation no longer applies
///
/// # Example
/// ```rust,ignore
/// use std::sync::Arc;
/// use lorekeeper::storage::persistent::open_store;
/// use lorekeeper::LoreEngine;
///
/// let store = open_store("./saga.lore", None)?;
/// let engine = LoreEngine::new(Arc::new(store));
/// ```
pub fn open_store(path: impl AsRef<Path>, config: Option<PersistentConfig>) -> LoreResult<PersistentStoryStore> {
    PersistentStoryStore::open(path.as_ref(), config.unwrap_or_default())
}
