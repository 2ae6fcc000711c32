//! Request-to-route resolution with a per-path resolution cache.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::params::{RouteParamError, RouteParams};
use super::route::{Route, normalize_path, placeholder_name};
use super::table::RouteTable;
use crate::http::Method;

// A single template segment, either a literal or a named capture (`{name}`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter,
}

// A parametric route split into segments once, at matcher construction.
#[derive(Debug)]
struct Compiled {
    route: Arc<Route>,
    segments: Vec<Segment>,
    param_count: usize,
}

impl Compiled {
    fn new(route: Arc<Route>) -> Self {
        let segments: Vec<Segment> = route
            .url()
            .split('/')
            .skip(1)
            .map(|s| match placeholder_name(s) {
                Some(_) => Segment::Parameter,
                None => Segment::Static(s.to_owned()),
            })
            .collect();
        let param_count = segments
            .iter()
            .filter(|s| matches!(s, Segment::Parameter))
            .count();
        Self {
            route,
            segments,
            param_count,
        }
    }

    // Raw captures in template order, or `None` when a literal differs or a
    // placeholder would capture an empty segment (`/a//b`).
    fn captures<'p>(&self, path: &[&'p str]) -> Option<Vec<&'p str>> {
        if self.segments.len() != path.len() {
            return None;
        }
        let mut captured = Vec::with_capacity(self.param_count);
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Static(literal) if literal != actual => return None,
                Segment::Static(_) => {}
                Segment::Parameter if actual.is_empty() => return None,
                Segment::Parameter => captured.push(*actual),
            }
        }
        Some(captured)
    }
}

/// A request resolved to a route.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRoute {
    route: Arc<Route>,
    raw: Vec<(String, String)>,
    params: RouteParams,
}

impl MatchedRoute {
    fn bind(route: Arc<Route>, captures: &[&str]) -> Result<Self, RouteParamError> {
        let mut raw = Vec::with_capacity(captures.len());
        let mut params = RouteParams::new();
        for ((name, ty), value) in route
            .params()
            .iter()
            .zip(route.param_types())
            .zip(captures)
        {
            params.push(name.clone(), ty.coerce(name, value)?);
            raw.push((name.clone(), (*value).to_owned()));
        }
        Ok(Self { route, raw, params })
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    /// Parameter values as they appeared in the path, in template order.
    pub fn raw_params(&self) -> &[(String, String)] {
        &self.raw
    }

    pub fn raw_param(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parameter values coerced to the declared types.
    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn into_parts(self) -> (Arc<Route>, RouteParams) {
        (self.route, self.params)
    }
}

struct CachedResolution {
    method: Method,
    path: String,
    matched: MatchedRoute,
}

/// Resolves `(method, path)` pairs against a [`RouteTable`].
///
/// Resolution order:
///
/// 1. the resolution cache, keyed by a hash of method and normalized path;
/// 2. an exact lookup, which finds every route without placeholders;
/// 3. a scan of parametric routes with the same segment count whose literal
///    segments all match. The candidate with the **fewest** placeholders
///    wins; among equals the first declared wins.
///
/// Successful resolutions are cached. The cache stops accepting new entries
/// once it holds `capacity` paths.
pub struct RouteMatcher {
    table: RouteTable,
    parametric: HashMap<Method, Vec<Compiled>>,
    cache: RwLock<HashMap<u64, CachedResolution>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RouteMatcher {
    pub fn new(table: RouteTable, capacity: usize) -> Self {
        let mut parametric: HashMap<Method, Vec<Compiled>> = HashMap::new();
        for route in table.iter().filter(|r| r.is_parametric()) {
            parametric
                .entry(route.method())
                .or_default()
                .push(Compiled::new(Arc::clone(route)));
        }
        Self {
            table,
            parametric,
            cache: RwLock::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Finds the route for `method` and `path`.
    ///
    /// Returns `Ok(None)` when nothing matches.
    ///
    /// # Errors
    ///
    /// [`RouteParamError`] when a route matched but a parameter did not
    /// coerce to its declared type.
    pub fn resolve(&self, method: Method, path: &str) -> Result<Option<MatchedRoute>, RouteParamError> {
        let path = normalize_path(path);
        let key = resolution_key(method, &path);

        if let Some(matched) = self.cached(key, method, &path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(method = %method, path = %path, route = matched.route().name(), "resolution cache hit");
            return Ok(Some(matched));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let matched = match self.table.find(method, &path) {
            Some(route) if !route.is_parametric() => MatchedRoute::bind(Arc::clone(route), &[])?,
            _ => match self.best_candidate(method, &path) {
                Some((route, captures)) => MatchedRoute::bind(route, &captures)?,
                None => return Ok(None),
            },
        };

        self.remember(key, method, path, &matched);
        Ok(Some(matched))
    }

    fn best_candidate<'p>(&self, method: Method, path: &'p str) -> Option<(Arc<Route>, Vec<&'p str>)> {
        let segments: Vec<&str> = path.split('/').skip(1).collect();
        let mut best: Option<(&Compiled, Vec<&str>)> = None;
        for compiled in self.parametric.get(&method)? {
            if best
                .as_ref()
                .is_some_and(|(b, _)| b.param_count <= compiled.param_count)
            {
                continue;
            }
            if let Some(captures) = compiled.captures(&segments) {
                best = Some((compiled, captures));
            }
        }
        best.map(|(compiled, captures)| (Arc::clone(&compiled.route), captures))
    }

    fn cached(&self, key: u64, method: Method, path: &str) -> Option<MatchedRoute> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .get(&key)
            .filter(|c| c.method == method && c.path == path)
            .map(|c| c.matched.clone())
    }

    fn remember(&self, key: u64, method: Method, path: String, matched: &MatchedRoute) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.len() >= self.capacity && !cache.contains_key(&key) {
            return;
        }
        cache.insert(
            key,
            CachedResolution {
                method,
                path,
                matched: matched.clone(),
            },
        );
    }

    /// Number of cached resolutions.
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Fraction of lookups answered by the resolution cache.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl std::fmt::Debug for RouteMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatcher")
            .field("routes", &self.table.len())
            .field("cached", &self.cached_len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn resolution_key(method: Method, path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    method.hash(&mut hasher);
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareRegistry;
    use crate::router::{ParamValue, RouteDefinition};

    fn matcher(definitions: Vec<RouteDefinition>) -> RouteMatcher {
        let table = RouteTable::build(&definitions, &MiddlewareRegistry::new()).unwrap();
        RouteMatcher::new(table, 100)
    }

    fn users() -> RouteMatcher {
        matcher(vec![
            RouteDefinition::get("/users/{id}", "UserController::show")
                .name("user_show")
                .param("id", "int"),
            RouteDefinition::get("/users/me", "UserController::me").name("user_me"),
            RouteDefinition::get("/", "Home::index"),
        ])
    }

    fn name_of(m: &RouteMatcher, method: Method, path: &str) -> Option<String> {
        m.resolve(method, path)
            .unwrap()
            .map(|matched| matched.route().name().to_owned())
    }

    // ── exact and parametric ─────────────────────────────────────────────────

    #[test]
    fn literal_route_beats_placeholder() {
        let m = users();
        assert_eq!(name_of(&m, Method::Get, "/users/me").as_deref(), Some("user_me"));
    }

    #[test]
    fn placeholder_is_bound_and_coerced() {
        let m = users();
        let matched = m.resolve(Method::Get, "/users/42").unwrap().unwrap();
        assert_eq!(matched.route().name(), "user_show");
        assert_eq!(matched.raw_param("id"), Some("42"));
        assert_eq!(matched.params().get("id"), Some(&ParamValue::Int(42)));
    }

    #[test]
    fn paths_are_normalized_before_matching() {
        let m = users();
        assert_eq!(name_of(&m, Method::Get, "").as_deref(), Some("index"));
        assert_eq!(name_of(&m, Method::Get, "/users/me/").as_deref(), Some("user_me"));
        assert_eq!(name_of(&m, Method::Get, "users/7").as_deref(), Some("user_show"));
    }

    #[test]
    fn no_match_is_none() {
        let m = users();
        assert_eq!(name_of(&m, Method::Get, "/users/42/posts"), None);
        assert_eq!(name_of(&m, Method::Post, "/users/42"), None);
        assert_eq!(name_of(&m, Method::Get, "/accounts/me"), None);
    }

    #[test]
    fn empty_segment_never_fills_a_placeholder() {
        let m = matcher(vec![RouteDefinition::get("/a/{x}/b", "A::show")]);
        assert_eq!(m.resolve(Method::Get, "/a//b").unwrap(), None);
        assert_eq!(name_of(&m, Method::Get, "/a/1/b").as_deref(), Some("show"));
    }

    #[test]
    fn coercion_failure_is_an_error() {
        let m = users();
        assert_eq!(
            m.resolve(Method::Get, "/users/abc").unwrap_err(),
            RouteParamError::InvalidInt {
                name: "id".into(),
                value: "abc".into()
            }
        );
        assert_eq!(m.cached_len(), 0);
    }

    // ── tie-breaking ──────────────────────────────────────────────────────────

    #[test]
    fn fewest_placeholders_wins() {
        let m = matcher(vec![
            RouteDefinition::get("/product/{category}/{id}", "P::byCategory"),
            RouteDefinition::get("/product/edit/{id}", "P::edit"),
        ]);
        let matched = m.resolve(Method::Get, "/product/edit/5").unwrap().unwrap();
        assert_eq!(matched.route().name(), "edit");
        assert_eq!(matched.raw_params(), [("id".to_owned(), "5".to_owned())]);

        let matched = m.resolve(Method::Get, "/product/books/5").unwrap().unwrap();
        assert_eq!(matched.route().name(), "byCategory");
        assert_eq!(matched.params().get_str("category"), Some("books"));
    }

    #[test]
    fn equal_placeholders_first_declared_wins() {
        let m = matcher(vec![
            RouteDefinition::get("/{a}/x", "C::first"),
            RouteDefinition::get("/y/{b}", "C::second"),
        ]);
        assert_eq!(name_of(&m, Method::Get, "/y/x").as_deref(), Some("first"));
    }

    #[test]
    fn params_bind_in_template_order() {
        let m = matcher(vec![RouteDefinition::get(
            "/users/{user}/posts/{post}",
            "C::post",
        )
        .param("post", "int")]);
        let matched = m.resolve(Method::Get, "/users/ada/posts/3").unwrap().unwrap();
        let names: Vec<&str> = matched.params().iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["user", "post"]);
        assert_eq!(matched.params().get_int("post"), Some(3));
    }

    // ── resolution cache ──────────────────────────────────────────────────────

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let m = users();
        let first = m.resolve(Method::Get, "/users/42").unwrap();
        let second = m.resolve(Method::Get, "/users/42/").unwrap();
        assert_eq!(first, second);
        assert_eq!(m.cached_len(), 1);
        assert!((m.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn cache_is_keyed_by_method() {
        let m = matcher(vec![
            RouteDefinition::get("/items", "C::list"),
            RouteDefinition::post("/items", "C::create"),
        ]);
        assert_eq!(name_of(&m, Method::Get, "/items").as_deref(), Some("list"));
        assert_eq!(name_of(&m, Method::Post, "/items").as_deref(), Some("create"));
        assert_eq!(m.cached_len(), 2);
    }

    #[test]
    fn cache_respects_capacity() {
        let table = RouteTable::build(
            &[RouteDefinition::get("/n/{n}", "C::n")],
            &MiddlewareRegistry::new(),
        )
        .unwrap();
        let m = RouteMatcher::new(table, 2);
        for n in 0..5 {
            assert!(m.resolve(Method::Get, &format!("/n/{n}")).unwrap().is_some());
        }
        assert_eq!(m.cached_len(), 2);
    }
}
