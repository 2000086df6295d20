// ABOUTME: SharedContext, the write-once key/value store agents publish their outputs to.
// ABOUTME: Guarded by a single mutex; violations of the write-once invariant are dedicated errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use thiserror::Error;

/// Invariant violations on the shared context. Both indicate a
/// configuration or scheduling bug, never a transient condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("output key '{0}' was already written in this run")]
    DuplicateKey(String),

    #[error("no output was produced under key '{0}'")]
    MissingKey(String),
}

/// Append-only mapping from output key to produced content, scoped to a
/// single workflow run. A key, once written, is never overwritten; readers
/// only ever observe fully written values.
#[derive(Debug, Default)]
pub struct SharedContext {
    entries: Mutex<HashMap<String, String>>,
}

impl SharedContext {
    /// Create an empty context for a fresh run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish content under an output key. Fails if the key was already
    /// written during this run.
    pub fn put(&self, key: &str, value: String) -> Result<(), ContextError> {
        let mut entries = self.lock();
        if entries.contains_key(key) {
            return Err(ContextError::DuplicateKey(key.to_string()));
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Read the content published under a key. Fails if nothing was
    /// produced under that key.
    pub fn get(&self, key: &str) -> Result<String, ContextError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| ContextError::MissingKey(key.to_string()))
    }

    /// Returns true if the key has been written.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// All keys written so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// A sorted copy of every entry, for reporting.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned lock means a writer panicked mid-put; the map itself
        // is still a coherent HashMap, so recover the guard.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
