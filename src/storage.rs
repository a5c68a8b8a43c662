//! Key-value storage backing preferences (durable) and the welcome marker
//! (session scoped).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ChatError;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, ChatError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError>;
    fn remove(&mut self, key: &str) -> Result<(), ChatError>;
}

/// A JSON object of string values on disk, rewritten whole on every change.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, ChatError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ChatError::Storage(format!("corrupt store at {:?}: {}", self.path, e))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ChatError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError> {
        // A corrupt file is replaced rather than blocking every later write.
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), ChatError> {
        let mut entries = self.read_all().unwrap_or_default();
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

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
    fn get(&self, key: &str) -> Result<Option<String>, ChatError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), ChatError> {
        self.entries.remove(key);
        Ok(())
    }
}

fn data_dir_fallback() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".local/share"))
            .unwrap_or_else(|_| std::env::temp_dir())
    })
}

/// Durable store, survives restarts.
pub fn durable_store_path() -> PathBuf {
    data_dir_fallback().join("mindmeld/storage.json")
}

fn session_store_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mindmeld")
}

/// Session store, one file per parent shell so a restart inside the same
/// terminal session sees the same markers.
pub fn session_store_path() -> PathBuf {
    session_store_dir().join(format!("session-{}.json", std::os::unix::process::parent_id()))
}

fn session_store_pid(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("session-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Delete session stores in `dir` whose shell is no longer running.
/// Returns how many files were removed.
pub fn prune_session_stores(dir: &Path, is_alive: impl Fn(u32) -> bool) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No session stores to prune in {:?}: {}", dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(session_store_pid) else {
            continue;
        };
        if is_alive(pid) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale session store {:?}: {}", entry.path(), e),
        }
    }

    if removed > 0 {
        debug!("Removed {} stale session stores from {:?}", removed, dir);
    }
    removed
}

/// Prune the session stores of shells that have exited.
pub fn prune_stale_session_stores() -> usize {
    prune_session_stores(&session_store_dir(), process_alive)
}
