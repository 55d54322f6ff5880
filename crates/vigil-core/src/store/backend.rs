// ── Storage backends ──
//
// A string key/value store shared by every instance ("tab") of the
// client. Writes are announced on a broadcast channel tagged with the
// writer's tab id so each instance can pick up the others' changes.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const FILE_SUFFIX: &str = ".json";

// ── Tab identity ─────────────────────────────────────────────────────

/// Identifies one client instance sharing a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    /// Writer, or `None` when the change came from another process.
    pub origin: Option<TabId>,
}

// ── Backend trait ────────────────────────────────────────────────────

/// Persistent string storage shared between instances.
pub trait StorageBackend: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    fn set(&self, key: &str, value: &str, origin: TabId) -> Result<(), CoreError>;

    fn remove(&self, key: &str, origin: TabId) -> Result<(), CoreError>;

    fn keys(&self) -> Result<Vec<String>, CoreError>;

    /// Every write and removal made after this call.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

// ── In-memory backend ────────────────────────────────────────────────

/// Process-local backend. Several stores sharing one `MemoryBackend`
/// behave like browser tabs sharing one origin's storage.
pub struct MemoryBackend {
    entries: DashMap<String, String>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            events,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str, origin: TabId) -> Result<(), CoreError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        // No subscribers is fine.
        let _ = self.events.send(StorageEvent {
            key: key.to_owned(),
            new_value: Some(value.to_owned()),
            origin: Some(origin),
        });
        Ok(())
    }

    fn remove(&self, key: &str, origin: TabId) -> Result<(), CoreError> {
        if self.entries.remove(key).is_some() {
            let _ = self.events.send(StorageEvent {
                key: key.to_owned(),
                new_value: None,
                origin: Some(origin),
            });
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

// ── File backend ─────────────────────────────────────────────────────

/// Size and modification time, used to spot writes by other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// One JSON file per key under a data directory.
///
/// Writes go to a temp file that is renamed over the target, so readers
/// (including other processes) never see a half-written snapshot.
pub struct FileBackend {
    dir: PathBuf,
    seen: DashMap<String, FileStamp>,
    events: broadcast::Sender<StorageEvent>,
}

impl FileBackend {
    /// Open (creating if needed) a backend rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir.display().to_string(), &e))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let backend = Self {
            dir,
            seen: DashMap::new(),
            events,
        };
        for (key, stamp) in backend.scan()? {
            backend.seen.insert(key, stamp);
        }
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{FILE_SUFFIX}"))
    }

    fn scan(&self) -> Result<Vec<(String, FileStamp)>, CoreError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| io_error(&self.dir.display().to_string(), &e))?;
        let mut found = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| n.strip_suffix(FILE_SUFFIX)) else {
                continue;
            };
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    found.push((
                        key.to_owned(),
                        FileStamp {
                            modified,
                            len: meta.len(),
                        },
                    ));
                }
            }
        }
        Ok(found)
    }

    fn stamp(path: &Path) -> Option<FileStamp> {
        let meta = fs::metadata(path).ok()?;
        Some(FileStamp {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }

    /// Compare the directory against what this backend last saw and
    /// announce every difference as a change from another process.
    pub fn poll_external(&self) -> Result<usize, CoreError> {
        let current = self.scan()?;
        let mut present = HashSet::with_capacity(current.len());
        let mut changed = 0;

        for (key, stamp) in current {
            present.insert(key.clone());
            let unchanged = self.seen.get(&key).is_some_and(|s| *s == stamp);
            if unchanged {
                continue;
            }
            self.seen.insert(key.clone(), stamp);
            let new_value = self.get(&key)?;
            debug!(key, "external write detected");
            let _ = self.events.send(StorageEvent {
                key,
                new_value,
                origin: None,
            });
            changed += 1;
        }

        let gone: Vec<String> = self
            .seen
            .iter()
            .filter(|e| !present.contains(e.key()))
            .map(|e| e.key().clone())
            .collect();
        for key in gone {
            self.seen.remove(&key);
            debug!(key, "external removal detected");
            let _ = self.events.send(StorageEvent {
                key,
                new_value: None,
                origin: None,
            });
            changed += 1;
        }

        Ok(changed)
    }

    /// Rescan the directory every `period` until cancelled.
    pub fn watch_external(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = backend.poll_external() {
                            warn!(error = %e, "storage rescan failed");
                        }
                    }
                }
            }
        })
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, &e)),
        }
    }

    fn set(&self, key: &str, value: &str, origin: TabId) -> Result<(), CoreError> {
        let path = self.path_for(key);
        write_atomic(&path, value.as_bytes()).map_err(|e| io_error(key, &e))?;
        if let Some(stamp) = Self::stamp(&path) {
            self.seen.insert(key.to_owned(), stamp);
        }
        let _ = self.events.send(StorageEvent {
            key: key.to_owned(),
            new_value: Some(value.to_owned()),
            origin: Some(origin),
        });
        Ok(())
    }

    fn remove(&self, key: &str, origin: TabId) -> Result<(), CoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                self.seen.remove(key);
                let _ = self.events.send(StorageEvent {
                    key: key.to_owned(),
                    new_value: None,
                    origin: Some(origin),
                });
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, &e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.scan()?.into_iter().map(|(k, _)| k).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

/// Write through a uniquely named sibling, then rename over `path`. The
/// temp name never ends in `.json`, so a scan skips it.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", Uuid::new_v4().simple()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn io_error(key: &str, err: &io::Error) -> CoreError {
    CoreError::Storage {
        key: key.to_owned(),
        message: err.to_string(),
    }
}
