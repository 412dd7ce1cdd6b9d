//! Persistent config-entry storage.
//!
//! Each integration instance owns one small, versioned key-value blob. The
//! blob is stored as a JSON file named after the entry id; writes go to a
//! temporary file that is then renamed over the old one, so a crash never
//! leaves a half-written entry behind.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// A stored config entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,

    /// Integration domain that owns the entry
    pub domain: String,

    /// Schema version of `data`
    pub version: u32,

    /// Stable identity of the configured thing (a serial number, ...)
    pub unique_id: String,

    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ConfigEntry {
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(|v| v.as_bool())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Corrupt config entry {0}: {1}")]
    Corrupt(PathBuf, #[source] serde_json::Error),

    #[error("Invalid entry id '{0}'")]
    InvalidEntryId(String),
}

/// Directory-backed store of config entries
#[derive(Debug, Clone)]
pub struct EntryStore {
    dir: PathBuf,
}

impl EntryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, entry_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !entry_id.is_empty()
            && entry_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidEntryId(entry_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", entry_id)))
    }

    /// Load an entry, returning `None` if it has never been saved
    pub fn load(&self, entry_id: &str) -> Result<Option<ConfigEntry>, StoreError> {
        let path = self.path_for(entry_id)?;
        let contents = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(path, e)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(path, e))
    }

    /// Persist an entry, replacing any previous version
    pub fn save(&self, entry: &ConfigEntry) -> Result<(), StoreError> {
        let path = self.path_for(&entry.entry_id)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(self.dir.clone(), e))?;

        let contents =
            serde_json::to_vec_pretty(entry).map_err(|e| StoreError::Corrupt(path.clone(), e))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| StoreError::Io(tmp.clone(), e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::Io(path.clone(), e))?;

        debug!(
            "Saved config entry {} (version {})",
            entry.entry_id, entry.version
        );
        Ok(())
    }
}
