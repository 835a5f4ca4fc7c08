//! Pluggable storage backends with a dict-in/dict-out contract.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Failure inside a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The stored bytes were not valid for the backend's format.
    #[error("malformed data: {0}")]
    Format(#[from] serde_json::Error),

    /// Nothing stored at the path.
    #[error("no data at '{0}'")]
    NotFound(PathBuf),
}

/// Storage contract consumed by
/// [`StatePersistence`](crate::persistence::StatePersistence).
///
/// Backends move schemaless maps in and out of storage; they never see the
/// snapshot type itself, so any backend satisfying this contract can hold
/// snapshots.
pub trait StorageBackend: Send {
    /// Persist `data` at `path`, replacing whatever was there.
    fn save(&self, data: &Value, path: &Path) -> Result<(), BackendError>;

    /// Load the map stored at `path`.
    fn load(&self, path: &Path) -> Result<Value, BackendError>;

    /// Whether anything is stored at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Remove the data at `path`. Returns whether anything was removed.
    fn delete(&self, path: &Path) -> Result<bool, BackendError>;
}

/// Backend writing pretty-printed JSON files.
///
/// Parent directories are created on save.
#[derive(Debug, Default)]
pub struct JsonFileBackend;

impl JsonFileBackend {
    /// Create a JSON file backend.
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for JsonFileBackend {
    fn save(&self, data: &Value, path: &Path) -> Result<(), BackendError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(data)?;
        fs::write(path, text)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Value, BackendError> {
        if !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete(&self, path: &Path) -> Result<bool, BackendError> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

/// In-process backend keyed by path. Useful for tests and ephemeral saves.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<PathBuf, Value>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn save(&self, data: &Value, path: &Path) -> Result<(), BackendError> {
        self.entries
            .lock()
            .expect("memory backend lock poisoned")
            .insert(path.to_path_buf(), data.clone());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Value, BackendError> {
        self.entries
            .lock()
            .expect("memory backend lock poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries
            .lock()
            .expect("memory backend lock poisoned")
            .contains_key(path)
    }

    fn delete(&self, path: &Path) -> Result<bool, BackendError> {
        Ok(self
            .entries
            .lock()
            .expect("memory backend lock poisoned")
            .remove(path)
            .is_some())
    }
}
