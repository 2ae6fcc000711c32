//! In-memory cache adapters.
//!
//! [`MemoryCache`] is a host-shared store: clones share the same map, so every
//! worker in the process sees the same entries, and several namespaces can
//! live side by side in it. [`LocalCache`] is the fallback used when no shared
//! store is reachable; it belongs to one adapter instance and cannot
//! pattern-delete.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use super::error::{CacheError, CacheResult};
use super::pattern::{KeyNamespace, KeyPattern};
use super::CacheAdapter;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Host-shared in-memory cache with TTL support.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    namespace: KeyNamespace,
}

impl MemoryCache {
    pub fn new(namespace: KeyNamespace) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            namespace,
        }
    }

    /// A second view on the same store under a different namespace.
    pub fn with_namespace(&self, namespace: KeyNamespace) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            namespace,
        }
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    /// Live entries in this namespace.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|(k, e)| self.namespace.strip(k).is_some() && e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|stored, _| match self.namespace.strip(stored) {
            Some(logical) => !predicate(logical),
            None => true,
        });
        before - entries.len()
    }
}

impl CacheAdapter for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let stored = self.namespace.key(key);
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&stored) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        // Expired: drop it so the map does not accumulate dead entries.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(&stored).is_some_and(|e| !e.is_live(now)) {
            entries.remove(&stored);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(self.namespace.key(key), Entry::new(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(&self.namespace.key(key)).is_some())
    }

    fn delete_by_key_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let pattern = KeyPattern::parse(pattern)?;
        Ok(self.remove_where(|key| pattern.matches(key)))
    }

    fn clear(&self) -> CacheResult<()> {
        self.remove_where(|_| true);
        Ok(())
    }

    fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Process-local fallback cache.
///
/// Each instance owns its entries. Pattern deletion is not available and is
/// reported as [`CacheError::Unsupported`].
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheAdapter for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.lock().insert(key.to_owned(), Entry::new(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    fn delete_by_key_pattern(&self, _pattern: &str) -> CacheResult<usize> {
        Err(CacheError::Unsupported {
            adapter: "local cache",
            operation: "pattern deletion",
        })
    }

    fn clear(&self) -> CacheResult<()> {
        self.lock().clear();
        Ok(())
    }

    fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
