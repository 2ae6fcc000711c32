//! The route table: every route, indexed by name and by `(method, url)`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::route::{Route, RouteDefinition, RouteError};
use crate::cache::{CacheAdapter, CacheAdapterExt};
use crate::config::Environment;
use crate::http::Method;
use crate::middleware::MiddlewareRegistry;

/// Immutable set of validated routes.
///
/// Declaration order is kept; it breaks ties during matching.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    by_name: HashMap<String, usize>,
    by_method_url: HashMap<Method, HashMap<String, usize>>,
}

impl RouteTable {
    /// Validates every definition and indexes the result.
    ///
    /// # Errors
    ///
    /// The first [`RouteError`] encountered. Nothing is registered on failure.
    pub fn build(
        definitions: &[RouteDefinition],
        registry: &MiddlewareRegistry,
    ) -> Result<Self, RouteError> {
        let routes = definitions
            .iter()
            .map(|def| def.build(registry))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_routes(routes)
    }

    /// Indexes already-validated routes, enforcing name and `(method, url)`
    /// uniqueness.
    pub fn from_routes(routes: Vec<Route>) -> Result<Self, RouteError> {
        let mut table = Self::default();
        for route in routes {
            let index = table.routes.len();
            if table.by_name.contains_key(route.name()) {
                return Err(RouteError::DuplicateName {
                    name: route.name().to_owned(),
                });
            }
            let by_url = table.by_method_url.entry(route.method()).or_default();
            if by_url.contains_key(route.url()) {
                return Err(RouteError::DuplicateRoute {
                    method: route.method(),
                    url: route.url().to_owned(),
                });
            }
            by_url.insert(route.url().to_owned(), index);
            table.by_name.insert(route.name().to_owned(), index);
            table.routes.push(Arc::new(route));
        }
        Ok(table)
    }

    /// Builds the table, going through the shared cache outside development.
    ///
    /// In development, or without a cache, the definitions are always
    /// rebuilt. Otherwise a persisted table under `key` is reused; when none
    /// exists (or it no longer decodes or references unknown middleware) the
    /// table is rebuilt and written back without expiry.
    ///
    /// # Errors
    ///
    /// - Any [`RouteError`] from building.
    /// - [`RouteError::Cache`] if the cache itself fails.
    pub fn load_or_build(
        definitions: &[RouteDefinition],
        registry: &MiddlewareRegistry,
        cache: Option<&dyn CacheAdapter>,
        environment: Environment,
        key: &str,
    ) -> Result<Self, RouteError> {
        let cache = match cache {
            Some(cache) if !environment.is_development() => cache,
            _ => {
                let table = Self::build(definitions, registry)?;
                info!(routes = table.len(), environment = %environment, "route table built");
                return Ok(table);
            }
        };

        match cache.get_json::<Vec<Route>>(key) {
            Ok(Some(routes)) => match Self::validated_cached(routes, registry) {
                Ok(table) => {
                    info!(routes = table.len(), key, adapter = cache.name(), "route table loaded from cache");
                    return Ok(table);
                }
                Err(err) => warn!(key, error = %err, "cached route table rejected; rebuilding"),
            },
            Ok(None) => {}
            Err(crate::cache::CacheError::Serialization(err)) => {
                warn!(key, error = %err, "cached route table is corrupt; rebuilding");
            }
            Err(err) => return Err(err.into()),
        }

        let table = Self::build(definitions, registry)?;
        cache.set_json(key, &table.routes(), None)?;
        info!(routes = table.len(), key, adapter = cache.name(), "route table built and persisted");
        Ok(table)
    }

    fn validated_cached(routes: Vec<Route>, registry: &MiddlewareRegistry) -> Result<Self, RouteError> {
        for route in &routes {
            if let Some(node) = route.middleware() {
                registry
                    .check_node(node)
                    .map_err(|source| RouteError::Middleware {
                        route: route.name().to_owned(),
                        source,
                    })?;
            }
        }
        Self::from_routes(routes)
    }

    /// Route registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<Route>> {
        self.by_name.get(name).map(|&i| &self.routes[i])
    }

    /// Route registered for exactly `method` and the normalized `url`.
    pub fn find(&self, method: Method, url: &str) -> Option<&Arc<Route>> {
        self.by_method_url
            .get(&method)?
            .get(url)
            .map(|&i| &self.routes[i])
    }

    /// Routes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    /// Owned copies of the routes, for serialization.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.iter().map(|r| Route::clone(r)).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
