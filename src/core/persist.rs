//! Key-value persistence for thread snapshots.
//!
//! A snapshot is two entries: the JSON list of threads under [`THREADS_KEY`]
//! and the active thread id, as decimal text, under [`ACTIVE_THREAD_KEY`].
//! The on-disk backend stores each entry in its own file inside the data
//! directory and replaces files atomically. A thread list that no longer
//! parses is moved aside rather than overwritten.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::core::thread::{Thread, ThreadId};

pub const THREADS_KEY: &str = "threads";
pub const ACTIVE_THREAD_KEY: &str = "activeThread";

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize threads: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("saved {key} is not valid JSON: {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Move the entry under `key` out of the way so later writes cannot
    /// clobber it. Returns where it went, or `None` if nothing was moved.
    fn set_aside(&mut self, key: &str) -> Result<Option<String>, PersistError>;
}

/// Stores each key as a file in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        match key {
            THREADS_KEY => self.dir.join("threads.json"),
            other => self.dir.join(other),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistError::Io { path, source }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key);
        let io_err = |source| PersistError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        temp_file.write_all(value.as_bytes()).map_err(io_err)?;
        temp_file.as_file_mut().sync_all().map_err(io_err)?;
        temp_file.persist(&path).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    fn set_aside(&mut self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key);
        let mut backup = path.clone().into_os_string();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        match fs::rename(&path, &backup) {
            Ok(()) => Ok(Some(backup.display().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistError::Io { path, source }),
        }
    }
}

/// In-process store used for `--ephemeral` sessions and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_aside(&mut self, key: &str) -> Result<Option<String>, PersistError> {
        let Some(value) = self.entries.remove(key) else {
            return Ok(None);
        };
        let backup = format!("{key}.bak");
        self.entries.insert(backup.clone(), value);
        Ok(Some(backup))
    }
}

/// Reads through to another store and drops every write. Used by commands
/// that only inspect saved threads.
pub struct ReadOnlyStore {
    inner: Box<dyn KeyValueStore>,
}

impl ReadOnlyStore {
    pub fn new(inner: Box<dyn KeyValueStore>) -> Self {
        Self { inner }
    }
}

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.inner.get(key)
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<(), PersistError> {
        Ok(())
    }

    fn set_aside(&mut self, _key: &str) -> Result<Option<String>, PersistError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub threads: Vec<Thread>,
    pub active: Option<ThreadId>,
}

pub fn write_snapshot(
    store: &mut dyn KeyValueStore,
    threads: &[Thread],
    active: Option<ThreadId>,
) -> Result<(), PersistError> {
    write_threads(store, threads)?;
    write_active(store, active)
}

pub fn write_threads(store: &mut dyn KeyValueStore, threads: &[Thread]) -> Result<(), PersistError> {
    let serialized = serde_json::to_string(threads)?;
    store.set(THREADS_KEY, &serialized)
}

pub fn write_active(
    store: &mut dyn KeyValueStore,
    active: Option<ThreadId>,
) -> Result<(), PersistError> {
    let active_text = active.map_or_else(|| "null".to_string(), |id| id.to_string());
    store.set(ACTIVE_THREAD_KEY, &active_text)
}

/// Read the saved snapshot. A missing or empty thread list means no prior
/// state; a thread list that does not parse is [`PersistError::Corrupt`].
pub fn read_snapshot(store: &dyn KeyValueStore) -> Result<Option<Snapshot>, PersistError> {
    let Some(raw_threads) = store.get(THREADS_KEY)? else {
        return Ok(None);
    };

    let threads: Vec<Thread> =
        serde_json::from_str(&raw_threads).map_err(|source| PersistError::Corrupt {
            key: THREADS_KEY,
            source,
        })?;
    if threads.is_empty() {
        return Ok(None);
    }

    let active = store
        .get(ACTIVE_THREAD_KEY)?
        .and_then(|raw| raw.parse::<ThreadId>().ok());

    Ok(Some(Snapshot { threads, active }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;
    use tempfile::TempDir;

    fn sample_threads() -> Vec<Thread> {
        let mut first = Thread::new(ThreadId::new(1_700_000_000_000));
        first.messages.push(Message::user("Hi"));
        first.messages.push(Message::assistant("Hello!"));
        let second = Thread::new(ThreadId::new(1_700_000_000_500));
        vec![first, second]
    }

    #[test]
    fn file_store_round_trips_snapshot() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = FileStore::new(dir.path().join("data"));
        let threads = sample_threads();

        write_snapshot(&mut store, &threads, Some(threads[1].id)).expect("write");

        assert!(dir.path().join("data/threads.json").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("data/activeThread")).expect("read"),
            "1700000000500"
        );

        let snapshot = read_snapshot(&store).expect("read").expect("snapshot");
        assert_eq!(snapshot.threads, threads);
        assert_eq!(snapshot.active, Some(threads[1].id));
    }

    #[test]
    fn missing_entries_mean_no_prior_state() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path());
        assert_eq!(read_snapshot(&store).expect("read"), None);

        let mut memory = MemoryStore::new();
        memory.set(THREADS_KEY, "[]").expect("set");
        assert_eq!(read_snapshot(&memory).expect("read"), None);
    }

    #[test]
    fn unreadable_json_is_reported_as_corrupt() {
        let mut memory = MemoryStore::new();
        memory.set(THREADS_KEY, "{not json").expect("set");
        assert!(matches!(
            read_snapshot(&memory),
            Err(PersistError::Corrupt { key: THREADS_KEY, .. })
        ));
    }

    #[test]
    fn file_store_sets_aside_without_overwriting() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = FileStore::new(dir.path());
        store.set(THREADS_KEY, "{not json").expect("set");

        let moved = store.set_aside(THREADS_KEY).expect("set aside");
        let backup = dir.path().join("threads.json.bak");
        assert_eq!(moved, Some(backup.display().to_string()));
        assert_eq!(fs::read_to_string(&backup).expect("read"), "{not json");
        assert!(!dir.path().join("threads.json").exists());
        assert_eq!(store.set_aside(THREADS_KEY).expect("set aside"), None);
    }

    #[test]
    fn read_only_store_reads_through_and_drops_writes() {
        let dir = TempDir::new().expect("tempdir");
        let mut backing = FileStore::new(dir.path());
        write_snapshot(&mut backing, &sample_threads(), None).expect("write");
        let before = fs::read_to_string(dir.path().join("threads.json")).expect("read");

        let mut store = ReadOnlyStore::new(Box::new(backing));
        assert_eq!(
            read_snapshot(&store).expect("read").expect("snapshot").threads,
            sample_threads()
        );
        write_snapshot(&mut store, &[], Some(ThreadId::new(1))).expect("write");
        assert_eq!(store.set_aside(THREADS_KEY).expect("set aside"), None);

        assert_eq!(
            fs::read_to_string(dir.path().join("threads.json")).expect("read"),
            before
        );
        assert!(!dir.path().join("threads.json.bak").exists());
    }

    #[test]
    fn null_active_thread_reads_as_none() {
        let mut memory = MemoryStore::new();
        write_snapshot(&mut memory, &sample_threads(), None).expect("write");
        assert_eq!(
            memory.get(ACTIVE_THREAD_KEY).expect("get").as_deref(),
            Some("null")
        );
        let snapshot = read_snapshot(&memory).expect("read").expect("snapshot");
        assert_eq!(snapshot.active, None);
    }

    #[test]
    fn threads_use_browser_compatible_layout() {
        let mut memory = MemoryStore::new();
        write_snapshot(&mut memory, &sample_threads()[..1], None).expect("write");
        let raw = memory.get(THREADS_KEY).expect("get").expect("value");
        assert_eq!(
            raw,
            r#"[{"id":1700000000000,"messages":[{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello!"}]}]"#
        );
    }
}
