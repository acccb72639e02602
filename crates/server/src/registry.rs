//! Concurrency-safe named registries.
//!
//! `get` returns a reference-counted handle, never a bare reference into
//! registry-owned storage: a concurrent `unregister` cannot invalidate a
//! handle already held by an in-flight call — the entry is dropped only
//! when its last holder releases it. The lock covers structural access
//! only; callers execute handlers after the guard is gone.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    DuplicateName(String),
}

/// A named map of shared entries. `T` is usually a trait object.
pub struct Registry<T: ?Sized> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register an entry. Names are unique; re-registering is an error.
    pub fn register(&self, name: impl Into<String>, entry: Arc<T>) -> Result<(), RegistryError> {
        let name = name.into();
        let mut entries = self.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        entries.insert(name, entry);
        Ok(())
    }

    /// Remove an entry. Returns whether it existed. In-flight holders of
    /// the removed handle keep it alive until they finish.
    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Shared handle to an entry.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.read().get(name).cloned()
    }

    /// Registered names, sorted for deterministic listing order.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted (name, handle) snapshot for list endpoints.
    pub fn snapshot(&self) -> Vec<(String, Arc<T>)> {
        let mut entries: Vec<(String, Arc<T>)> = self
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
