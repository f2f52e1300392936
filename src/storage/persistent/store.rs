//! Durable story store: in-memory state plus a write-ahead log.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ExecutionError, LoreError, LoreResult};
use crate::storage::backend::StateBackend;
use crate::storage::memory::InMemoryStoryStore;
use crate::storage::state::{Applied, Mutation, StoryState};
use crate::storage::StorageError;

use super::file_lock::FileLock;
use super::wal::WriteAheadLog;
use super::PersistentConfig;

const WAL_FILE: &str = "lore.wal";

fn storage_error(message: String) -> LoreError {
    LoreError::Execution(ExecutionError::Storage { message })
}

/// A story store that survives restarts.
///
/// Reads are served from memory. Each write is validated, appended to the
/// log, and only then applied, all while holding the state's write lock.
pub struct PersistentStoryStore {
    dir: PathBuf,
    _lock: FileLock,
    wal: WriteAheadLog,
    inner: InMemoryStoryStore,
}

impl PersistentStoryStore {
    /// Open or create a store in `dir`, replaying its log.
    pub fn open(dir: &Path, config: PersistentConfig) -> LoreResult<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| storage_error(format!("failed to create store directory: {e}")))?;

        let lock = FileLock::acquire(dir).map_err(|e| storage_error(format!("failed to acquire lock: {e}")))?;

        let (wal, recovered) = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(|e| storage_error(format!("failed to open write-ahead log: {e}")))?;

        let inner = InMemoryStoryStore::new();
        let replayed = recovered.entries.len();
        for entry in recovered.entries {
            let sequence = entry.sequence;
            inner
                .mutate_with(entry.mutation, |_| Ok(()))
                .map_err(|e| storage_error(format!("failed to replay log entry {sequence}: {e}")))?;
        }

        info!(
            path = %dir.display(),
            replayed,
            discarded_bytes = recovered.discarded_bytes,
            "opened story store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            inner,
        })
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StateBackend for PersistentStoryStore {
    fn read_state<R>(&self, context: &'static str, f: impl FnOnce(&StoryState) -> R) -> Result<R, StorageError> {
        self.inner.read_state(context, f)
    }

    fn submit(&self, mutation: Mutation) -> Result<Applied, StorageError> {
        self.inner.mutate_with(mutation, |m| {
            self.wal
                .append(m)
                .map(|_| ())
                .map_err(|e| StorageError::BackendError(format!("write-ahead log append failed: {e}")))
        })
    }
}
