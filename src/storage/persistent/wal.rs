//! Write-ahead log of story mutations.
//!
//! Every validated [`Mutation`] is appended (and optionally fsynced) before it
//! is applied in memory; on open the log is replayed to rebuild state.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec frame of WalEntry]
//! [ENTRY 2: codec frame of WalEntry]
//! ...
//! ```
//!
//! A frame that is cut short or fails its checksum marks the end of the
//! usable log. Recovery keeps everything before it and truncates the rest so
//! later appends are not stranded behind garbage.
//!
//! Frames are written unbuffered in one `write_all`. If an append fails, the
//! file is cut back to the end of the last acknowledged frame, so a rejected
//! mutation never reaches a later replay.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::state::Mutation;

use super::codec;

/// A logged mutation.
#[derive(Debug, Clone, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number, starting at 1.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The mutation to replay.
    pub mutation: Mutation,
}

#[derive(Serialize)]
struct WalRecord<'a> {
    sequence: u64,
    timestamp: DateTime<Utc>,
    mutation: &'a Mutation,
}

/// Outcome of reading a log from disk.
#[derive(Debug, Default)]
pub struct Recovered {
    /// Intact entries in log order.
    pub entries: Vec<WalEntry>,
    /// Bytes dropped from a torn or corrupt tail.
    pub discarded_bytes: u64,
}

/// Where frames land. A file in production.
trait LogSink: Write + Send {
    fn sync(&mut self) -> IoResult<()>;
    fn truncate(&mut self, len: u64) -> IoResult<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> IoResult<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> IoResult<()> {
        self.set_len(len)
    }
}

struct Writer {
    sink: Box<dyn LogSink>,
    sequence: u64,
    /// End of the last acknowledged frame.
    len: u64,
    /// Set when a failed append could not be rolled back.
    needs_recovery: bool,
}

impl Writer {
    fn write_frame(&mut self, frame: &[u8], sync: bool) -> IoResult<()> {
        self.sink.write_all(frame)?;
        if sync {
            self.sink.sync()?;
        }
        Ok(())
    }
}

/// Append-only mutation log.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<Writer>,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Opens or creates the log, returning it together with its valid entries.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<(Self, Recovered)> {
        let recovered = if path.exists() && std::fs::metadata(path)?.len() >= codec::HEADER_LEN {
            recover(path)?
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            file.sync_all()?;
            Recovered::default()
        };

        let sequence = recovered.entries.last().map_or(0, |e| e.sequence);
        let file = OpenOptions::new().append(true).open(path)?;
        let len = file.metadata()?.len();

        let wal = Self::with_sink(path, Box::new(file), sequence, len, sync_on_write);
        Ok((wal, recovered))
    }

    fn with_sink(path: &Path, sink: Box<dyn LogSink>, sequence: u64, len: u64, sync_on_write: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Writer {
                sink,
                sequence,
                len,
                needs_recovery: false,
            }),
            sync_on_write,
        }
    }

    /// Appends a mutation. Returns its sequence number.
    pub fn append(&self, mutation: &Mutation) -> IoResult<u64> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("poisoned lock: wal.append"))?;

        if writer.needs_recovery {
            return Err(std::io::Error::other(
                "write-ahead log holds an unacknowledged frame; reopen the store to recover",
            ));
        }

        let sequence = writer.sequence + 1;
        let frame = codec::encode(&WalRecord {
            sequence,
            timestamp: Utc::now(),
            mutation,
        })?;

        if let Err(e) = writer.write_frame(&frame, self.sync_on_write) {
            let len = writer.len;
            if let Err(rollback) = writer.sink.truncate(len) {
                warn!(
                    path = %self.path.display(),
                    offset = len,
                    error = %rollback,
                    "failed to roll back write-ahead log append"
                );
                writer.needs_recovery = true;
            }
            return Err(e);
        }

        writer.sequence = sequence;
        writer.len += frame.len() as u64;
        Ok(sequence)
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        self.writer
            .lock()
            .map(|w| w.sequence)
            .map_err(|_| std::io::Error::other("poisoned lock: wal.sequence"))
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every intact entry and truncates the file after the last one.
fn recover(path: &Path) -> IoResult<Recovered> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    codec::read_header(&mut reader)?;

    let mut entries = Vec::new();
    let mut valid_len = codec::HEADER_LEN;
    while valid_len < file_len {
        match codec::decode::<WalEntry>(&mut reader) {
            Ok(entry) => {
                entries.push(entry);
                valid_len = reader.stream_position()?;
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof || e.kind() == ErrorKind::InvalidData => {
                warn!(
                    path = %path.display(),
                    offset = valid_len,
                    after_sequence = entries.last().map_or(0, |last: &WalEntry| last.sequence),
                    error = %e,
                    "discarding torn write-ahead log tail"
                );
                break;
            }
            Err(e) => return Err(e),
        }
    }

    let discarded_bytes = file_len - valid_len;
    if discarded_bytes > 0 {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    Ok(Recovered { entries, discarded_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::entity::{EntityId, EntityKind, NamedEntity};
    use tempfile::tempdir;

    fn insert(name: &str) -> Mutation {
        Mutation::InsertEntity(NamedEntity::new(EntityKind::Character, name))
    }

    #[test]
    fn test_append_and_recover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lore.wal");

        {
            let (wal, recovered) = WriteAheadLog::open(&path, false).unwrap();
            assert!(recovered.entries.is_empty());
            assert_eq!(wal.append(&insert("Mara")).unwrap(), 1);
            assert_eq!(wal.append(&Mutation::DeleteEntities(vec![EntityId::new()])).unwrap(), 2);
        }

        let (wal, recovered) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovered.entries.len(), 2);
        assert_eq!(recovered.discarded_bytes, 0);
        assert_eq!(recovered.entries[0].sequence, 1);
        assert!(matches!(recovered.entries[0].mutation, Mutation::InsertEntity(_)));
        assert_eq!(wal.current_sequence().unwrap(), 2);
    }

    /// Shared in-memory log that can tear the next frame halfway.
    #[derive(Clone, Default)]
    struct TearingSink {
        bytes: Arc<Mutex<Vec<u8>>>,
        tear_next: Arc<AtomicBool>,
        torn: bool,
    }

    impl Write for TearingSink {
        fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
            if self.torn {
                self.torn = false;
                return Err(std::io::Error::other("disk full"));
            }
            let mut bytes = self.bytes.lock().unwrap();
            if self.tear_next.swap(false, Ordering::SeqCst) && buf.len() > 1 {
                let half = buf.len() / 2;
                bytes.extend_from_slice(&buf[..half]);
                self.torn = true;
                return Ok(half);
            }
            bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> IoResult<()> {
            Ok(())
        }
    }

    impl LogSink for TearingSink {
        fn sync(&mut self) -> IoResult<()> {
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> IoResult<()> {
            self.bytes.lock().unwrap().truncate(usize::try_from(len).unwrap());
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lore.wal");

        let sink = TearingSink::default();
        codec::write_header(&mut *sink.bytes.lock().unwrap()).unwrap();
        let wal = WriteAheadLog::with_sink(&path, Box::new(sink.clone()), 0, codec::HEADER_LEN, false);

        assert_eq!(wal.append(&insert("Mara")).unwrap(), 1);
        sink.tear_next.store(true, Ordering::SeqCst);
        assert!(wal.append(&insert("Dorian")).is_err());
        assert_eq!(wal.current_sequence().unwrap(), 1);
        assert_eq!(wal.append(&insert("Elena")).unwrap(), 2);

        std::fs::write(&path, sink.bytes.lock().unwrap().as_slice()).unwrap();
        let (_, recovered) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovered.discarded_bytes, 0);
        let names: Vec<String> = recovered
            .entries
            .iter()
            .filter_map(|e| match &e.mutation {
                Mutation::InsertEntity(entity) => Some(entity.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["Mara", "Elena"]);
    }

    #[test]
    fn test_torn_tail_is_truncated_and_appends_continue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lore.wal");

        {
            let (wal, _) = WriteAheadLog::open(&path, true).unwrap();
            wal.append(&insert("Mara")).unwrap();
            wal.append(&insert("Dorian")).unwrap();
        }

        let full_len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 4).unwrap();
        drop(file);

        {
            let (wal, recovered) = WriteAheadLog::open(&path, true).unwrap();
            assert_eq!(recovered.entries.len(), 1);
            assert!(recovered.discarded_bytes > 0);
            assert_eq!(wal.append(&insert("Elena")).unwrap(), 2);
        }

        let (_, recovered) = WriteAheadLog::open(&path, true).unwrap();
        let names: Vec<String> = recovered
            .entries
            .iter()
            .filter_map(|e| match &e.mutation {
                Mutation::InsertEntity(entity) => Some(entity.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["Mara", "Elena"]);
    }
}
