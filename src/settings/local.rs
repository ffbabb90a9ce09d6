//! Local persistent key-value stores for cached settings.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use super::LocalStore;

/// In-memory store. Holds values for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().expect("local store lock poisoned");
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().expect("local store lock poisoned");
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().expect("local store lock poisoned");
        values.remove(key);
        Ok(())
    }
}

/// Device-local store backed by a single JSON object file.
///
/// ```text
/// ~/.cache/daybook/local.json
/// { "dayStartTime": "05:00" }
/// ```
///
/// The file is rewritten through a sibling temp file and a rename, so a crash
/// mid-write leaves the previous contents intact.
#[derive(Debug, Clone)]
pub struct JsonFileLocalStore {
    path: PathBuf,
}

impl JsonFileLocalStore {
    /// Default file location under the user cache directory, if the
    /// platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("daybook").join("local.json"))
    }

    /// Open the store at a custom file path.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse local cache file: {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read local cache file: {:?}", self.path))
            }
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create local cache dir: {parent:?}"))?;
        }

        let content =
            serde_json::to_string_pretty(values).context("Failed to serialize local cache")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write local cache file: {tmp:?}"))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace local cache file: {:?}", self.path))?;
        Ok(())
    }
}

impl LocalStore for JsonFileLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // A corrupt file is replaced rather than blocking the write.
        let mut values = self.read_all().unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = match self.read_all() {
            Ok(values) => values,
            Err(_) => return self.write_all(&BTreeMap::new()),
        };
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_get_set_remove() -> Result<()> {
        let store = MemoryLocalStore::new();
        assert_eq!(store.get("k")?, None);
        store.set("k", "v")?;
        assert_eq!(store.get("k")?.as_deref(), Some("v"));
        store.remove("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn test_file_store_missing_file_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let store = JsonFileLocalStore::with_path(dir.path().join("nested").join("local.json"));
        assert_eq!(store.get("dayStartTime")?, None);
        store.remove("dayStartTime")?;
        Ok(())
    }

    #[test]
    fn test_file_store_persists_across_instances() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("local.json");

        JsonFileLocalStore::with_path(&path).set("dayStartTime", "06:15")?;
        JsonFileLocalStore::with_path(&path).set("other", "x")?;

        let reopened = JsonFileLocalStore::with_path(&path);
        assert_eq!(reopened.get("dayStartTime")?.as_deref(), Some("06:15"));
        assert_eq!(reopened.get("other")?.as_deref(), Some("x"));

        reopened.remove("dayStartTime")?;
        assert_eq!(reopened.get("dayStartTime")?, None);
        assert_eq!(reopened.get("other")?.as_deref(), Some("x"));
        Ok(())
    }

    #[test]
    fn test_file_store_corrupt_file_errors_on_read_and_recovers_on_write() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("local.json");
        std::fs::write(&path, "{not json")?;

        let store = JsonFileLocalStore::with_path(&path);
        assert!(store.get("dayStartTime").is_err());

        store.set("dayStartTime", "05:30")?;
        assert_eq!(store.get("dayStartTime")?.as_deref(), Some("05:30"));
        Ok(())
    }
}
