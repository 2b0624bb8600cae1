//! File-backed key-value storage
//!
//! One file per key under a directory. Writes go to a temporary file that
//! is renamed over the target, so readers never see a partial value.
//!
//! Each handle watches the directory, so writes made through another handle
//! or process on the same directory reach its change feed too. A handle's
//! own writes are announced once, directly.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aiza_core::{KeyValueStorage, StorageChange};
use aiza_domain::{AuthError, Result, StorageConfig};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const WATCH_DEBOUNCE: Duration = Duration::from_millis(50);
const VALUE_SUFFIX: &str = ".json";

type DirWatcher = Debouncer<RecommendedWatcher, RecommendedCache>;

/// Last value this handle has announced per key.
type KnownValues = Arc<Mutex<HashMap<String, Option<String>>>>;

/// Storage rooted at a directory. Clones share the change feed.
#[derive(Clone)]
pub struct FileStorage {
    dir: PathBuf,
    changes: broadcast::Sender<StorageChange>,
    known: KnownValues,
    write_lock: Arc<Mutex<()>>,
    watcher: Option<Arc<Mutex<DirWatcher>>>,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory.
    ///
    /// If the directory cannot be watched the storage still works, but only
    /// this handle's own writes are announced.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AuthError::Storage(format!("failed to create {}: {e}", dir.display()))
        })?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let known = KnownValues::default();

        let watcher = match watch_dir(&dir, changes.clone(), Arc::clone(&known)) {
            Ok(watcher) => Some(Arc::new(Mutex::new(watcher))),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Storage directory not watched");
                None
            }
        };

        debug!(dir = %dir.display(), watched = watcher.is_some(), "Opened file storage");
        Ok(Self { dir, changes, known, write_lock: Arc::new(Mutex::new(())), watcher })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::open(&config.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether writes from other handles are observed.
    pub fn is_watched(&self) -> bool {
        self.watcher.is_some()
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(AuthError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}{VALUE_SUFFIX}")))
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        announce(&self.changes, &self.known, key, new_value);
    }
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage")
            .field("dir", &self.dir)
            .field("watched", &self.is_watched())
            .finish_non_exhaustive()
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Publish `new_value` for `key` unless it is what was last announced.
fn announce(
    changes: &broadcast::Sender<StorageChange>,
    known: &KnownValues,
    key: &str,
    new_value: Option<String>,
) {
    {
        let mut known = known.lock();
        if known.get(key) == Some(&new_value) {
            return;
        }
        known.insert(key.to_string(), new_value.clone());
    }
    let _ = changes.send(StorageChange { key: key.to_string(), new_value });
}

fn watch_dir(
    dir: &Path,
    changes: broadcast::Sender<StorageChange>,
    known: KnownValues,
) -> notify_debouncer_full::notify::Result<DirWatcher> {
    let mut debouncer = new_debouncer(WATCH_DEBOUNCE, None, move |result: DebounceEventResult| {
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for e in errors {
                    warn!(error = %e, "Storage watcher error");
                }
                return;
            }
        };

        for event in events {
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            for path in &event.paths {
                let Some(key) = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_suffix(VALUE_SUFFIX))
                    .filter(|key| is_valid_key(key))
                else {
                    continue;
                };
                let current = match fs::read_to_string(path) {
                    Ok(contents) => Some(contents),
                    Err(e) if e.kind() == ErrorKind::NotFound => None,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read changed entry");
                        continue;
                    }
                };
                announce(&changes, &known, key, current);
            }
        }
    })?;
    debouncer.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(debouncer)
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("failed to read {}: {e}", path.display()))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let _guard = self.write_lock.lock();
        fs::write(&tmp, value).map_err(|e| {
            AuthError::Storage(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            AuthError::Storage(format!("failed to replace {}: {e}", path.display()))
        })?;
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                self.notify(key, None);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(AuthError::Storage(format!("failed to remove {}: {e}", path.display())))
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
