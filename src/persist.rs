//! Persistent view state
//!
//! A flat key/value store with dotted keys (`parallel.order`,
//! `xy.axis_x`, ...). Views receive a [`StateScope`] and namespace their own
//! keys through [`StateScope::children`].

use crate::error::StateError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Backing store for persisted view state.
pub trait PersistentState: Send + Sync {
    fn get_raw(&self, key: &str) -> Option<serde_json::Value>;
    fn set_raw(&self, key: &str, value: serde_json::Value) -> Result<(), StateError>;
    /// Remove every key starting with `prefix`.
    fn clear_prefix(&self, prefix: &str) -> Result<(), StateError>;
}

type Entries = BTreeMap<String, serde_json::Value>;

fn read(map: &RwLock<Entries>) -> RwLockReadGuard<'_, Entries> {
    map.read().unwrap_or_else(|e| e.into_inner())
}

fn write(map: &RwLock<Entries>) -> RwLockWriteGuard<'_, Entries> {
    map.write().unwrap_or_else(|e| e.into_inner())
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryState {
    entries: RwLock<Entries>,
}

impl InMemoryState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentState for InMemoryState {
    fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        read(&self.entries).get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: serde_json::Value) -> Result<(), StateError> {
        write(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<(), StateError> {
        write(&self.entries).retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

/// YAML file on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileState {
    path: PathBuf,
    entries: RwLock<Entries>,
}

impl FileState {
    /// Open (or start) a state file. A missing file is an empty state.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Entries::new()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            Entries::new()
        };
        tracing::debug!("State file {:?} opened with {} keys", path, entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &Entries) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let yaml = serde_yaml::to_string(entries)?;
        std::fs::write(&self.path, yaml)?;
        Ok(())
    }
}

impl PersistentState for FileState {
    fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        read(&self.entries).get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: serde_json::Value) -> Result<(), StateError> {
        let mut entries = write(&self.entries);
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn clear_prefix(&self, prefix: &str) -> Result<(), StateError> {
        let mut entries = write(&self.entries);
        entries.retain(|k, _| !k.starts_with(prefix));
        self.flush(&entries)
    }
}

/// A namespaced view onto a [`PersistentState`].
#[derive(Clone)]
pub struct StateScope {
    store: Arc<dyn PersistentState>,
    prefix: String,
}

impl std::fmt::Debug for StateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateScope").field("prefix", &self.prefix).finish()
    }
}

impl StateScope {
    pub fn new(store: Arc<dyn PersistentState>) -> Self {
        Self {
            store,
            prefix: String::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryState::new()))
    }

    pub fn children(&self, name: &str) -> StateScope {
        Self {
            store: self.store.clone(),
            prefix: format!("{}{}.", self.prefix, name),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Typed read. A stored value of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = self.key(name);
        let raw = self.store.get_raw(&key)?;
        match serde_json::from_value(raw) {
            Ok(v) => Some(v),
            Err(source) => {
                let err = StateError::Value { key, source };
                tracing::warn!("Ignoring persisted value: {}", err);
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        self.get(name).unwrap_or(default)
    }

    pub fn set<T: Serialize>(&self, name: &str, value: &T) {
        let key = self.key(name);
        let result = serde_json::to_value(value)
            .map_err(|source| StateError::Value {
                key: key.clone(),
                source,
            })
            .and_then(|v| self.store.set_raw(&key, v));
        if let Err(e) = result {
            crate::log_error!(e, key = %key);
        }
    }

    /// Drop every key under this scope.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear_prefix(&self.prefix) {
            crate::log_error!(e, prefix = %self.prefix);
        }
    }
}
