//! Request routing: route table, matching, middleware gating, and dispatch.
//!
//! Routes are declared with [`RouteDefinition`] and bound to async handlers on
//! a [`RouterBuilder`]. Building validates every declaration up front; a
//! single bad route aborts the build and nothing is registered.
//!
//! | Template               | Example match      | Captured params         |
//! |------------------------|--------------------|-------------------------|
//! | `/users`               | `/users`           | *(none)*                |
//! | `/users/{id}`          | `/users/42`        | `id → 42` (if `int`)    |
//! | `/product/{cat}/{id}`  | `/product/books/7` | `cat → "books"`, `id → "7"` |
//!
//! Trailing slashes are normalized on both templates and incoming paths, and
//! an empty path is `/`. When several templates match, the one with the
//! fewest placeholders wins; ties go to the route declared first.
//!
//! [`Router::dispatch`] renders every outcome as a [`Response`]:
//!
//! | Outcome                          | Response                                   |
//! |----------------------------------|--------------------------------------------|
//! | no route                         | `404` HTML page                            |
//! | parameter does not coerce        | `400` (JSON under the API prefix)          |
//! | middleware fails                 | `403` JSON under the API prefix, else `302` to the access-denied page |
//! | middleware returns a response    | that response                              |
//! | middleware check errors          | `500`                                      |
//! | otherwise                        | the handler's response                     |

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error};

use crate::cache::CacheAdapter;
use crate::config::{AppConfig, RoutingConfig};
use crate::context::{Context, CurrentRoute};
use crate::middleware::{MiddlewareExecutor, MiddlewareRegistry, Outcome};
use crate::{Request, Response, StatusCode};

pub mod matcher;
pub mod params;
pub mod route;
pub mod table;

pub use matcher::{MatchedRoute, RouteMatcher};
pub use params::{ParamType, ParamValue, RouteParamError, RouteParams};
pub use route::{Route, RouteDefinition, RouteError, normalize_path};
pub use table::RouteTable;

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be shared across
/// connection tasks without copying the underlying closure. In practice you
/// never construct this type directly; bind handlers with
/// [`RouterBuilder::route`] and friends instead.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// Collects route declarations, handlers, and middleware, then builds a
/// [`Router`].
///
/// # Examples
///
/// ```rust
/// use routegate::config::AppConfig;
/// use routegate::router::{RouteDefinition, RouterBuilder};
/// use routegate::{Response, StatusCode};
///
/// let router = RouterBuilder::new(AppConfig::default())
///     .route(
///         RouteDefinition::get("/users/{id}", "UserController::show")
///             .name("user_show")
///             .param("id", "int"),
///         |ctx: routegate::context::Context| async move {
///             let id = ctx.params().get_int("id").unwrap_or_default();
///             Response::new(StatusCode::Ok).body(id.to_string())
///         },
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(router.route_link("user_show"), "/users/{id}");
/// assert_eq!(router.route_link("nope"), "#nope");
/// ```
pub struct RouterBuilder {
    config: AppConfig,
    cache: Option<Arc<dyn CacheAdapter>>,
    registry: MiddlewareRegistry,
    definitions: Vec<RouteDefinition>,
    handlers: HashMap<String, Handler>,
}

impl RouterBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cache: None,
            registry: MiddlewareRegistry::new(),
            definitions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Shared cache used to persist the route table outside development.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheAdapter>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn middleware(mut self, registry: MiddlewareRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Declares a route and binds `handler` to its handler reference.
    #[must_use]
    pub fn route(mut self, definition: RouteDefinition, handler: impl IntoHandler) -> Self {
        self.handlers.insert(definition.handler().to_owned(), erase(handler));
        self.definitions.push(definition);
        self
    }

    /// Binds `handler` under `handler_ref` without declaring a route.
    ///
    /// Used when routes come from a persisted table rather than from
    /// declarations in this process.
    #[must_use]
    pub fn handler(mut self, handler_ref: impl Into<String>, handler: impl IntoHandler) -> Self {
        self.handlers.insert(handler_ref.into(), erase(handler));
        self
    }

    /// Register a handler for `GET` requests matching `url`.
    #[must_use]
    pub fn get(self, url: &str, handler_ref: &str, handler: impl IntoHandler) -> Self {
        self.route(RouteDefinition::get(url, handler_ref), handler)
    }

    /// Register a handler for `POST` requests matching `url`.
    #[must_use]
    pub fn post(self, url: &str, handler_ref: &str, handler: impl IntoHandler) -> Self {
        self.route(RouteDefinition::post(url, handler_ref), handler)
    }

    /// Builds (or loads) the route table and checks every route has a handler.
    ///
    /// # Errors
    ///
    /// Any [`RouteError`]; see [`RouteTable::load_or_build`].
    pub fn build(self) -> Result<Router, RouteError> {
        let routing = &self.config.routing;
        let table = RouteTable::load_or_build(
            &self.definitions,
            &self.registry,
            self.cache.as_deref(),
            self.config.environment,
            &routing.route_table_key,
        )?;

        if let Some(route) = table
            .iter()
            .find(|route| !self.handlers.contains_key(route.handler()))
        {
            return Err(RouteError::MissingHandler {
                route: route.name().to_owned(),
                handler: route.handler().to_owned(),
            });
        }

        let executor = MiddlewareExecutor::new(Arc::new(self.registry), routing);
        Ok(Router {
            matcher: RouteMatcher::new(table, routing.resolution_cache_capacity),
            executor,
            handlers: self.handlers,
            routing: routing.clone(),
        })
    }
}

// Erase the concrete handler type and store it as a `Handler` trait object.
fn erase(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

/// Dispatches requests through matching, middleware, and handlers.
///
/// A `Router` is immutable once built and is shared across connection tasks
/// behind an [`Arc`].
pub struct Router {
    matcher: RouteMatcher,
    executor: MiddlewareExecutor,
    handlers: HashMap<String, Handler>,
    routing: RoutingConfig,
}

impl Router {
    pub fn table(&self) -> &RouteTable {
        self.matcher.table()
    }

    pub fn matcher(&self) -> &RouteMatcher {
        &self.matcher
    }

    /// See [`RouteMatcher::resolve`].
    pub fn resolve(
        &self,
        method: crate::Method,
        path: &str,
    ) -> Result<Option<MatchedRoute>, RouteParamError> {
        self.matcher.resolve(method, path)
    }

    /// URL template of the route named `name`, or `#name` when unknown.
    pub fn route_link(&self, name: &str) -> String {
        match self.table().get(name) {
            Some(route) => route.url().to_owned(),
            None => format!("#{name}"),
        }
    }

    /// Like [`route_link`](Self::route_link), substituting `{param}`
    /// placeholders from `params`. Placeholders without a value are left as is.
    pub fn route_link_with(&self, name: &str, params: &[(&str, &dyn std::fmt::Display)]) -> String {
        let Some(route) = self.table().get(name) else {
            return format!("#{name}");
        };
        route
            .url()
            .split('/')
            .map(|segment| {
                route::placeholder_name(segment)
                    .and_then(|p| params.iter().find(|(n, _)| *n == p))
                    .map_or_else(|| segment.to_owned(), |(_, value)| value.to_string())
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Runs the full request pipeline and renders the outcome.
    pub async fn dispatch(&self, request: Request) -> Response {
        let method = request.method();
        let path = request.path().to_owned();

        let matched = match self.matcher.resolve(method, &path) {
            Ok(Some(matched)) => matched,
            Ok(None) => {
                debug!(method = %method, path = %path, "no route matched");
                return Response::not_found_page(&path);
            }
            Err(err) => {
                debug!(method = %method, path = %path, error = %err, "route parameter rejected");
                return self.bad_request(&path, &err);
            }
        };

        let (route, params) = matched.into_parts();
        let current = CurrentRoute {
            name: route.name().to_owned(),
            method: route.method(),
            url: route.url().to_owned(),
        };
        let mut ctx = Context::for_route(request, current, params);

        if let Some(node) = route.middleware() {
            match self.executor.run(node, &mut ctx) {
                Ok(Outcome::Proceed) => {}
                Ok(Outcome::Halt(response)) => {
                    debug!(route = route.name(), status = response.status().as_u16(), "middleware halted request");
                    return response;
                }
                Err(err) => {
                    error!(route = route.name(), error = %err, "middleware failed");
                    return self.server_error(&path);
                }
            }
        }

        match self.handlers.get(route.handler()) {
            Some(handler) => handler(ctx).await,
            None => {
                error!(route = route.name(), handler = route.handler(), "no handler bound");
                self.server_error(&path)
            }
        }
    }

    fn bad_request(&self, path: &str, err: &RouteParamError) -> Response {
        if self.executor.is_api_path(path) {
            Response::api_error(StatusCode::BadRequest, err.to_string())
        } else {
            Response::new(StatusCode::BadRequest)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(err.to_string())
        }
    }

    fn server_error(&self, path: &str) -> Response {
        if self.executor.is_api_path(path) {
            Response::api_error(StatusCode::InternalServerError, "internal server error")
        } else {
            Response::new(StatusCode::InternalServerError)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body("Internal Server Error")
        }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        handlers.sort_unstable();
        f.debug_struct("Router")
            .field("matcher", &self.matcher)
            .field("handlers", &handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::cache::{KeyNamespace, MemoryCache};
    use crate::config::Environment;
    use crate::middleware::{BoxError, Middleware, Verdict};
    use crate::Method;

    struct Fixed(bool);

    impl Middleware for Fixed {
        fn check(&mut self, _ctx: &mut Context) -> Result<Verdict, BoxError> {
            Ok(self.0.into())
        }
    }

    struct Broken;

    impl Middleware for Broken {
        fn check(&mut self, _ctx: &mut Context) -> Result<Verdict, BoxError> {
            Err("session store offline".into())
        }
    }

    struct Teapot;

    impl Middleware for Teapot {
        fn check(&mut self, _ctx: &mut Context) -> Result<Verdict, BoxError> {
            Ok(Verdict::Respond(Response::new(StatusCode::Accepted).body("queued")))
        }
    }

    fn registry() -> MiddlewareRegistry {
        let mut registry = MiddlewareRegistry::new();
        registry
            .register("allow", || Fixed(true))
            .register("deny", || Fixed(false))
            .register("broken", || Broken)
            .register("respond", || Teapot);
        registry
    }

    async fn echo_route(ctx: Context) -> Response {
        let name = ctx.route().map(|r| r.name.clone()).unwrap_or_default();
        Response::new(StatusCode::Ok).body(name)
    }

    fn router() -> Router {
        RouterBuilder::new(AppConfig::default())
            .middleware(registry())
            .route(
                RouteDefinition::get("/users/{id}", "UserController::show")
                    .name("user_show")
                    .param("id", "int"),
                |ctx: Context| async move {
                    let id = ctx.params().get_int("id").unwrap_or(-1);
                    Response::new(StatusCode::Ok).body(format!("user {id}"))
                },
            )
            .route(
                RouteDefinition::get("/users/me", "UserController::me").name("user_me"),
                echo_route,
            )
            .route(
                RouteDefinition::get("/admin", "AdminController::index").middleware("deny"),
                echo_route,
            )
            .route(
                RouteDefinition::get("/api/admin/{section}", "AdminApi::section")
                    .middleware_declaration(json!({"all": ["allow"], "any": ["deny"]})),
                echo_route,
            )
            .route(
                RouteDefinition::get("/api/items/{id}", "ItemApi::show").param("id", "int"),
                echo_route,
            )
            .route(
                RouteDefinition::get("/dashboard", "Dashboard::index")
                    .name("dashboard")
                    .middleware_declaration(json!({"any": ["deny", "allow"]})),
                echo_route,
            )
            .route(
                RouteDefinition::get("/broken", "C::broken").middleware("broken"),
                echo_route,
            )
            .route(
                RouteDefinition::get("/respond", "C::respond").middleware("respond"),
                echo_route,
            )
            .post("/users", "UserController::create", |_ctx| async {
                Response::new(StatusCode::Created)
            })
            .build()
            .unwrap()
    }

    fn get(path: &str) -> Request {
        Request::new(Method::Get, path)
    }

    // ── building ──────────────────────────────────────────────────────────────

    #[test]
    fn route_without_handler_is_rejected() {
        let mut config = AppConfig::default();
        config.environment = Environment::Prod;
        let cache: Arc<dyn CacheAdapter> = Arc::new(MemoryCache::new(KeyNamespace::none()));
        RouterBuilder::new(config.clone())
            .cache(Arc::clone(&cache))
            .get("/", "Home::index", echo_route)
            .build()
            .unwrap();

        // A later process loads the persisted table but binds no handler.
        let err = RouterBuilder::new(config).cache(cache).build().unwrap_err();
        assert!(matches!(
            err,
            RouteError::MissingHandler { ref handler, .. } if handler == "Home::index"
        ));
    }

    #[test]
    fn persisted_table_serves_bound_handlers() {
        let mut config = AppConfig::default();
        config.environment = Environment::Prod;
        let cache: Arc<dyn CacheAdapter> = Arc::new(MemoryCache::new(KeyNamespace::none()));
        RouterBuilder::new(config.clone())
            .cache(Arc::clone(&cache))
            .get("/", "Home::index", echo_route)
            .build()
            .unwrap();

        let router = RouterBuilder::new(config)
            .cache(cache)
            .handler("Home::index", echo_route)
            .build()
            .unwrap();
        assert_eq!(router.table().len(), 1);
    }

    #[test]
    fn unknown_middleware_aborts_build() {
        let err = RouterBuilder::new(AppConfig::default())
            .route(RouteDefinition::get("/", "Home::index").middleware("auth"), echo_route)
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "route `index`: middleware `auth` is not registered");
    }

    // ── reverse links ─────────────────────────────────────────────────────────

    #[test]
    fn route_links() {
        let router = router();
        let id: &dyn std::fmt::Display = &42;
        assert_eq!(router.route_link("user_me"), "/users/me");
        assert_eq!(router.route_link("ghost"), "#ghost");
        assert_eq!(router.route_link_with("user_show", &[("id", id)]), "/users/42");
        assert_eq!(router.route_link_with("user_show", &[]), "/users/{id}");
        assert_eq!(router.route_link_with("ghost", &[("id", id)]), "#ghost");
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn literal_route_wins_over_placeholder() {
        let res = router().dispatch(get("/users/me")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_text(), "user_me");
    }

    #[tokio::test]
    async fn typed_parameter_reaches_handler() {
        let res = router().dispatch(get("/users/42")).await;
        assert_eq!(res.body_text(), "user 42");
    }

    #[tokio::test]
    async fn unmatched_path_renders_not_found_page() {
        let res = router().dispatch(get("/nowhere")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(
            res.headers().get("Content-Type"),
            Some("text/html; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn wrong_method_is_not_found() {
        let res = router().dispatch(Request::new(Method::Delete, "/users/me")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn bad_parameter_is_400() {
        let res = router().dispatch(get("/users/abc")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(
            res.body_text(),
            "route parameter `id` must be an integer, got `abc`"
        );

        let res = router().dispatch(get("/api/items/x")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn denied_page_redirects() {
        let res = router().dispatch(get("/admin")).await;
        assert_eq!(res.status(), StatusCode::Found);
        assert_eq!(res.headers().get("Location"), Some("/access-denied"));
    }

    #[tokio::test]
    async fn denied_api_call_is_json_403() {
        let res = router().dispatch(get("/api/admin/users")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body, json!({"status": 403, "error": "access denied"}));
    }

    #[tokio::test]
    async fn any_gate_passes_when_one_child_passes() {
        let res = router().dispatch(get("/dashboard")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_text(), "dashboard");
    }

    #[tokio::test]
    async fn middleware_response_is_passed_through() {
        let res = router().dispatch(get("/respond")).await;
        assert_eq!(res.status(), StatusCode::Accepted);
        assert_eq!(res.body_text(), "queued");
    }

    #[tokio::test]
    async fn middleware_error_is_500() {
        let res = router().dispatch(get("/broken")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn post_route_dispatches() {
        let res = router().dispatch(Request::new(Method::Post, "/users/")).await;
        assert_eq!(res.status(), StatusCode::Created);
    }

    #[tokio::test]
    async fn handler_sees_current_route() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let router = RouterBuilder::new(AppConfig::default())
            .route(
                RouteDefinition::get("/p/{slug}", "Page::show"),
                move |ctx: Context| {
                    let sink = Arc::clone(&sink);
                    async move {
                        *sink.lock().unwrap() = ctx.route().cloned();
                        Response::new(StatusCode::NoContent)
                    }
                },
            )
            .build()
            .unwrap();

        let res = router.dispatch(get("/p/hello")).await;
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(CurrentRoute {
                name: "show".into(),
                method: Method::Get,
                url: "/p/{slug}".into(),
            })
        );
    }
}
