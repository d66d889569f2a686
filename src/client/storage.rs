use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{AppError, AppResult};

pub const FILTERS: &str = "filters";
pub const SAVED_LIST: &str = "savedList";
pub const COPIED_IDS: &str = "copiedIds";
pub const PROMPT_COPIED_IDS: &str = "promptCopiedIds";
pub const MAILED_IDS: &str = "mailedIds";
pub const USER_PROFILE: &str = "userProfile";
pub const CUSTOM_PROMPT: &str = "customPrompt";
pub const USE_CUSTOM_PROMPT: &str = "useCustomPrompt";
pub const DISCLAIMER_ACCEPTED: &str = "disclaimerAccepted";

/// String key-value persistence in the shape of browser local storage.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// Local storage backed by a single JSON object on disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub const FILE_NAME: &'static str = "local_storage.json";

    pub fn open(dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "local storage is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Config("local storage lock poisoned".to_string()))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> AppResult<()> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), value);
        self.write(&entries)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

/// In-process storage for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
    writes: AtomicUsize,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set`/`remove` calls that reached the storage.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .map_err(|_| AppError::Config("local storage lock poisoned".to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .map_err(|_| AppError::Config("local storage lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}
