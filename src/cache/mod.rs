//! Caching layer: the key-value store shared by every worker.
//!
//! All adapters implement [`CacheAdapter`]:
//!
//! | Adapter        | Scope                        | Pattern delete |
//! |----------------|------------------------------|----------------|
//! | [`MemoryCache`]| host-shared, in memory       | yes            |
//! | `RedisCache`   | distributed (feature `redis`)| yes            |
//! | [`LocalCache`] | single adapter instance      | no: [`CacheError::Unsupported`] |
//!
//! Values are strings; [`CacheAdapterExt`] adds JSON helpers on top. Keys are
//! namespaced per deployment by [`KeyNamespace`] inside the shared adapters.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{CacheBackend, CacheConfig};

pub mod error;
pub mod memory;
pub mod pattern;
#[cfg(feature = "redis")]
pub mod distributed;

pub use error::{CacheError, CacheResult};
pub use memory::{LocalCache, MemoryCache};
pub use pattern::{KeyNamespace, KeyPattern};
#[cfg(feature = "redis")]
pub use distributed::RedisCache;

/// Key-value store contract shared by all cache backends.
///
/// Operations are blocking; a cache call is a single round trip.
pub trait CacheAdapter: Send + Sync {
    /// Short adapter name for log fields.
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key`, expiring after `ttl` when given.
    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Removes `key`, returning whether it existed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Removes every key matching `pattern` (see [`KeyPattern`]) and returns
    /// how many were removed.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidKeyPattern`] for interior wildcards.
    /// - [`CacheError::Unsupported`] on adapters that cannot enumerate keys.
    fn delete_by_key_pattern(&self, pattern: &str) -> CacheResult<usize>;

    /// Removes every key this adapter can see.
    fn clear(&self) -> CacheResult<()>;

    fn has(&self, key: &str) -> CacheResult<bool>;

    fn get_multiple(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn set_multiple(&self, items: &[(&str, String)], ttl: Option<Duration>) -> CacheResult<()> {
        for (key, value) in items {
            self.set(key, value.clone(), ttl)?;
        }
        Ok(())
    }

    /// Removes each key, returning how many existed.
    fn delete_multiple(&self, keys: &[&str]) -> CacheResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Typed helpers available on every [`CacheAdapter`].
pub trait CacheAdapterExt: CacheAdapter {
    /// Reads and decodes a JSON value.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encodes `value` as JSON and stores it.
    fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.set(key, serde_json::to_string(value)?, ttl)
    }

    /// Stores a scalar (string, number, bool, or null).
    ///
    /// # Errors
    ///
    /// [`CacheError::NonScalarValue`] for arrays and objects.
    fn set_scalar(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        use serde_json::Value;

        let kind = match value {
            Value::Array(_) => Some("an array"),
            Value::Object(_) => Some("an object"),
            _ => None,
        };
        if let Some(kind) = kind {
            return Err(CacheError::NonScalarValue {
                key: key.to_owned(),
                kind,
            });
        }
        self.set_json(key, value, ttl)
    }
}

impl<C: CacheAdapter + ?Sized> CacheAdapterExt for C {}

/// Builds the adapter selected by `config`.
///
/// A Redis backend that is unreachable, unconfigured, or not compiled in
/// degrades to a [`LocalCache`] with a warning rather than failing startup.
pub fn connect(config: &CacheConfig, namespace: &KeyNamespace) -> Arc<dyn CacheAdapter> {
    match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(namespace.clone())),
        CacheBackend::Local => Arc::new(LocalCache::new()),
        CacheBackend::Redis => connect_redis(config, namespace),
    }
}

#[cfg(feature = "redis")]
fn connect_redis(config: &CacheConfig, namespace: &KeyNamespace) -> Arc<dyn CacheAdapter> {
    let Some(url) = config.redis_url.as_deref() else {
        tracing::warn!("redis backend selected without a redis_url; using local cache");
        return Arc::new(LocalCache::new());
    };
    match RedisCache::connect(url, namespace.clone()) {
        Ok(cache) => {
            tracing::info!(url, "connected to redis cache");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "redis unavailable; using local cache");
            Arc::new(LocalCache::new())
        }
    }
}

#[cfg(not(feature = "redis"))]
fn connect_redis(_config: &CacheConfig, _namespace: &KeyNamespace) -> Arc<dyn CacheAdapter> {
    tracing::warn!("redis backend selected but the `redis` feature is disabled; using local cache");
    Arc::new(LocalCache::new())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        id: u32,
        tags: Vec<String>,
    }

    #[test]
    fn json_helpers_round_trip() {
        let cache = MemoryCache::new(KeyNamespace::none());
        let value = Snapshot {
            id: 7,
            tags: vec!["a".into()],
        };
        cache.set_json("snap", &value, None).unwrap();
        assert_eq!(cache.get_json::<Snapshot>("snap").unwrap(), Some(value));
        assert_eq!(cache.get_json::<Snapshot>("missing").unwrap(), None);
    }

    #[test]
    fn scalar_writes_reject_compound_values() {
        let cache = LocalCache::new();
        cache.set_scalar("n", &serde_json::json!(42), None).unwrap();
        assert_eq!(cache.get("n").unwrap().as_deref(), Some("42"));

        let err = cache
            .set_scalar("list", &serde_json::json!([1, 2]), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "value for key `list` must be a scalar, got an array");
        assert!(matches!(
            cache.set_scalar("obj", &serde_json::json!({"a": 1}), None),
            Err(CacheError::NonScalarValue { kind: "an object", .. })
        ));
    }

    #[test]
    fn connect_selects_backend() {
        let ns = KeyNamespace::new("t", "test");
        let memory = connect(&CacheConfig::default(), &ns);
        assert_eq!(memory.name(), "memory");

        let local = connect(
            &CacheConfig {
                backend: CacheBackend::Local,
                ..CacheConfig::default()
            },
            &ns,
        );
        assert_eq!(local.name(), "local");
    }

    #[test]
    fn redis_without_url_falls_back_to_local() {
        let cache = connect(
            &CacheConfig {
                backend: CacheBackend::Redis,
                redis_url: None,
                ..CacheConfig::default()
            },
            &KeyNamespace::none(),
        );
        assert_eq!(cache.name(), "local");
        assert!(matches!(
            cache.delete_by_key_pattern("*"),
            Err(CacheError::Unsupported { .. })
        ));
    }
}
