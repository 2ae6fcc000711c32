//! Entity repositories with an optional read-through cache.
//!
//! An [`EntityStore`] is the source of truth (a database in production,
//! [`InMemoryStore`] in tests). [`CachedRepository`] wraps a store and caches
//! every lookup under a [`RepositoryQueryKey`] derived from the query shape.
//!
//! Cached entries never expire on their own. Writes through the repository
//! (`add` / `remove`) purge every cached query for the entity type:
//!
//! ```text
//! find(7)          -> repo:user:one:7
//! find_all()       -> repo:user:all
//! find_one_by(..)  -> repo:user:oneBy:{"email":"a@b.c"}:[]
//! add(user)        -> delete repo:user:*
//! ```

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::cache::CacheError;

pub mod cached;
pub mod query;
pub mod store;

pub use cached::{CachedRepository, QueryStats, QueryStatsSnapshot};
pub use query::{Criteria, Direction, OrderBy, QueryKind, RepositoryQueryKey};
pub use store::InMemoryStore;

/// Boxed error from a store implementation.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} store failed: {source}")]
    Store {
        entity: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("cannot serialize {entity}: {source}")]
    Serialization {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A persistable domain object.
///
/// Entities are serialized in full when cached, so a cache hit rebuilds an
/// equal value.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable type name used in cache keys. Must not contain `:` or `*`.
    const NAME: &'static str;

    type Id: Serialize + Clone + PartialEq + fmt::Display + Send + Sync;

    fn id(&self) -> Self::Id;
}

/// The persistence collaborator behind a repository.
///
/// Writes are staged by [`persist`](Self::persist) / [`remove`](Self::remove)
/// and become visible on [`flush`](Self::flush).
pub trait EntityStore<E: Entity>: Send + Sync {
    fn find(&self, id: &E::Id) -> RepositoryResult<Option<E>>;

    fn find_one_by(&self, criteria: &Criteria, order_by: &OrderBy) -> RepositoryResult<Option<E>>;

    fn find_by(
        &self,
        criteria: &Criteria,
        order_by: &OrderBy,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> RepositoryResult<Vec<E>>;

    fn find_all(&self) -> RepositoryResult<Vec<E>>;

    fn persist(&self, entity: E) -> RepositoryResult<()>;

    fn remove(&self, id: &E::Id) -> RepositoryResult<()>;

    fn flush(&self) -> RepositoryResult<()>;
}
