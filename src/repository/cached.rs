//! Read-through caching repository.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    Criteria, Entity, EntityStore, OrderBy, RepositoryError, RepositoryQueryKey, RepositoryResult,
};
use crate::cache::{CacheAdapter, CacheError};
use crate::config::CacheConfig;

/// Lookup counters for one repository.
#[derive(Debug, Default)]
pub struct QueryStats {
    db_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Point-in-time copy of [`QueryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStatsSnapshot {
    pub db_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl QueryStats {
    pub fn snapshot(&self) -> QueryStatsSnapshot {
        QueryStatsSnapshot {
            db_requests: self.db_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Wraps an [`EntityStore`] with a read-through cache.
///
/// With caching disabled every call goes to the store. With caching enabled
/// a lookup is answered from the cache when possible; on a miss the store
/// result (including "not found") is serialized and stored without expiry.
///
/// `add` and `remove` flush the store and then purge every cached query for
/// `E` (`repo:{E::NAME}:*`). Adapters that cannot delete by pattern are
/// cleared instead.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use routegate::cache::{KeyNamespace, MemoryCache};
/// use routegate::repository::{CachedRepository, Entity, InMemoryStore};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// impl Entity for User {
///     const NAME: &'static str = "user";
///     type Id = u64;
///     fn id(&self) -> u64 {
///         self.id
///     }
/// }
///
/// let cache = Arc::new(MemoryCache::new(KeyNamespace::none()));
/// let repo = CachedRepository::new(InMemoryStore::<User>::new(), Some(cache));
/// repo.add(User { id: 1, name: "ada".into() }).unwrap();
///
/// assert_eq!(repo.find(&1).unwrap().unwrap().name, "ada");
/// assert_eq!(repo.find(&1).unwrap().unwrap().name, "ada");
/// assert_eq!(repo.stats().db_requests, 1);
/// assert_eq!(repo.stats().cache_hits, 1);
/// ```
pub struct CachedRepository<E: Entity, S> {
    store: S,
    cache: Option<Arc<dyn CacheAdapter>>,
    stats: QueryStats,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S> CachedRepository<E, S>
where
    E: Entity,
    S: EntityStore<E>,
{
    /// Caches through `cache`, or delegates directly when it is `None`.
    pub fn new(store: S, cache: Option<Arc<dyn CacheAdapter>>) -> Self {
        Self {
            store,
            cache,
            stats: QueryStats::default(),
            _entity: PhantomData,
        }
    }

    /// Uses `cache` only when `config.repository_cache` is set.
    pub fn from_config(store: S, cache: Arc<dyn CacheAdapter>, config: &CacheConfig) -> Self {
        Self::new(store, config.repository_cache.then_some(cache))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn stats(&self) -> QueryStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn find(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        let key = RepositoryQueryKey::one(E::NAME, id);
        self.read_through(&key, |store| store.find(id))
    }

    pub fn find_one_by(&self, criteria: &Criteria, order_by: &OrderBy) -> RepositoryResult<Option<E>> {
        let key = RepositoryQueryKey::one_by(E::NAME, criteria, order_by);
        self.read_through(&key, |store| store.find_one_by(criteria, order_by))
    }

    pub fn find_by(
        &self,
        criteria: &Criteria,
        order_by: &OrderBy,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> RepositoryResult<Vec<E>> {
        let key = RepositoryQueryKey::all_by(E::NAME, criteria, order_by, limit, offset);
        self.read_through(&key, |store| store.find_by(criteria, order_by, limit, offset))
    }

    pub fn find_all(&self) -> RepositoryResult<Vec<E>> {
        let key = RepositoryQueryKey::all(E::NAME);
        self.read_through(&key, |store| store.find_all())
    }

    /// Persists and flushes `entity`, then invalidates cached queries.
    pub fn add(&self, entity: E) -> RepositoryResult<()> {
        self.store.persist(entity)?;
        self.store.flush()?;
        self.invalidate()?;
        Ok(())
    }

    /// Removes and flushes `entity`, then invalidates cached queries.
    pub fn remove(&self, entity: &E) -> RepositoryResult<()> {
        self.store.remove(&entity.id())?;
        self.store.flush()?;
        self.invalidate()?;
        Ok(())
    }

    /// Drops every cached query for `E`, returning how many keys were removed.
    ///
    /// When the adapter cannot delete by pattern the whole cache is cleared
    /// and `0` is returned.
    pub fn invalidate(&self) -> RepositoryResult<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let pattern = RepositoryQueryKey::entity_pattern(E::NAME);
        match cache.delete_by_key_pattern(&pattern) {
            Ok(removed) => {
                debug!(entity = E::NAME, removed, "repository cache invalidated");
                Ok(removed)
            }
            Err(CacheError::Unsupported { adapter, .. }) => {
                debug!(entity = E::NAME, adapter, "pattern delete unsupported; clearing cache");
                cache.clear()?;
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read_through<T, F>(&self, key: &RepositoryQueryKey, load: F) -> RepositoryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&S) -> RepositoryResult<T>,
    {
        let Some(cache) = &self.cache else {
            return self.load(key, load);
        };

        if let Some(raw) = cache.get(key.as_str())? {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    QueryStats::record(&self.stats.cache_hits);
                    debug!(entity = E::NAME, key = %key, "repository cache hit");
                    return Ok(value);
                }
                Err(err) => warn!(entity = E::NAME, key = %key, error = %err, "discarding undecodable cache entry"),
            }
        }

        QueryStats::record(&self.stats.cache_misses);
        debug!(entity = E::NAME, key = %key, "repository cache miss");
        let value = self.load(key, load)?;
        let encoded = serde_json::to_string(&value).map_err(|source| {
            RepositoryError::Serialization {
                entity: E::NAME,
                source,
            }
        })?;
        cache.set(key.as_str(), encoded, None)?;
        Ok(value)
    }

    fn load<T, F>(&self, key: &RepositoryQueryKey, load: F) -> RepositoryResult<T>
    where
        F: FnOnce(&S) -> RepositoryResult<T>,
    {
        QueryStats::record(&self.stats.db_requests);
        debug!(entity = E::NAME, query = key.kind().as_str(), "DB request");
        load(&self.store)
    }
}
