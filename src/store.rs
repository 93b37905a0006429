// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Key/value persistence for client-side session state.
//!
//! Everything the source layer remembers between runs (credentials, the
//! active source, cache payloads and their timestamps, cooldown markers)
//! goes through [`SessionStore`]. The CLI uses [`FileStore`]; tests use
//! [`MemoryStore`].

use crate::error::{SourceError, SourceResult};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub const KEY_CREDENTIALS: &str = "credentials";
pub const KEY_PLAYLIST: &str = "playlist";
pub const KEY_ACTIVE_SOURCE: &str = "active_source";

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> SourceResult<()>;
    fn remove(&self, key: &str) -> SourceResult<()>;
    fn keys(&self) -> Vec<String>;

    /// Removes every key starting with `prefix`, returning how many went.
    fn remove_prefix(&self, prefix: &str) -> SourceResult<usize> {
        let doomed: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        for key in &doomed {
            self.remove(key)?;
        }
        Ok(doomed.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> SourceResult<()> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> SourceResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }
}

/// A JSON file holding the whole key/value map, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse state file: {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened state file {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default location: `{cache_dir}/iptv-source/state.json`.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?
            .join("iptv-source");
        Ok(dir.join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> SourceResult<()> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| SourceError::Store(format!("failed to serialize state: {}", e)))?;
        // Write beside the target, then rename over it.
        let tmp = self.temp_path();
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                SourceError::Store(format!(
                    "failed to write state file {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> SourceResult<()> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> SourceResult<()> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    fn remove_prefix(&self, prefix: &str) -> SourceResult<usize> {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.flush(&entries)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_remove_prefix() {
        let store = MemoryStore::new();
        store.set("cache:panel:abc:streams:1", "a".into()).unwrap();
        store.set("cache:panel:abc:streams:2", "b".into()).unwrap();
        store.set("cache:panel:abd:streams:1", "c".into()).unwrap();
        store.set("credentials", "d".into()).unwrap();

        let removed = store.remove_prefix("cache:panel:abc:").unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            store.keys(),
            vec!["cache:panel:abd:streams:1".to_string(), "credentials".to_string()]
        );
    }

    #[test]
    fn test_file_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(KEY_ACTIVE_SOURCE, "panel".into()).unwrap();
            store.set("cooldown:abc", "2025-01-01T00:00:00Z".into()).unwrap();
            store.remove("cooldown:abc").unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(KEY_ACTIVE_SOURCE).as_deref(), Some("panel"));
        assert_eq!(reopened.get("cooldown:abc"), None);
    }

    #[test]
    fn test_file_store_replaces_state_file_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();

        store.set(KEY_ACTIVE_SOURCE, "panel".into()).unwrap();
        store.set(KEY_ACTIVE_SOURCE, "playlist".into()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("state.json")]);

        let saved: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.get(KEY_ACTIVE_SOURCE).map(String::as_str), Some("playlist"));
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        assert!(FileStore::open(&path).is_err());
    }
}
