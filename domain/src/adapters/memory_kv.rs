use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{CoreError, KvStore};

/// Thread-safe in-memory key-value store.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the code under test wrote.
#[derive(Clone, Default)]
pub struct InMemoryKv {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without going through the async port.
    pub fn insert(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(key.to_string(), value.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Store("poisoned lock".into()))?;
        Ok(f(&mut map))
    }
}

impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.with_map(|m| m.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.with_map(|m| {
            m.insert(key.to_string(), value.to_string());
        })
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.with_map(|m| {
            m.remove(key);
        })
    }

    async fn list(&self) -> Result<Vec<String>, CoreError> {
        self.with_map(|m| m.keys().cloned().collect())
    }
}

/// Store whose every operation fails. Stands in for an unreachable backend.
#[derive(Clone, Debug)]
pub struct FailingKv {
    message: String,
}

impl FailingKv {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn err(&self) -> CoreError {
        CoreError::Store(self.message.clone())
    }
}

impl KvStore for FailingKv {
    async fn get(&self, _key: &str) -> Result<Option<String>, CoreError> {
        Err(self.err())
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), CoreError> {
        Err(self.err())
    }

    async fn delete(&self, _key: &str) -> Result<(), CoreError> {
        Err(self.err())
    }

    async fn list(&self) -> Result<Vec<String>, CoreError> {
        Err(self.err())
    }
}
