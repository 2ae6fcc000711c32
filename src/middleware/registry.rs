//! Middleware factories keyed by [`MiddlewareId`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Middleware, MiddlewareError, MiddlewareId, MiddlewareNode};

type Factory = Arc<dyn Fn() -> Box<dyn Middleware> + Send + Sync>;

/// Maps middleware identifiers to constructors.
///
/// Routes reference middleware by id; the registry is the only place those ids
/// turn into code, and route-table building rejects ids it does not know.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<MiddlewareId, Factory>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `id`, replacing any previous registration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use routegate::context::Context;
    /// use routegate::middleware::{BoxError, Middleware, MiddlewareRegistry, Verdict};
    ///
    /// struct AllowAll;
    ///
    /// impl Middleware for AllowAll {
    ///     fn check(&mut self, _ctx: &mut Context) -> Result<Verdict, BoxError> {
    ///         Ok(Verdict::Pass)
    ///     }
    /// }
    ///
    /// let mut registry = MiddlewareRegistry::new();
    /// registry.register("allow_all", || AllowAll);
    /// assert!(registry.contains(&"allow_all".into()));
    /// ```
    pub fn register<M, F>(&mut self, id: impl Into<MiddlewareId>, factory: F) -> &mut Self
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.factories
            .insert(id.into(), Arc::new(move || Box::new(factory()) as Box<dyn Middleware>));
        self
    }

    pub fn contains(&self, id: &MiddlewareId) -> bool {
        self.factories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds a fresh instance of the middleware registered under `id`.
    pub fn instantiate(&self, id: &MiddlewareId) -> Result<Box<dyn Middleware>, MiddlewareError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| MiddlewareError::UnknownMiddleware { id: id.clone() })
    }

    /// Validates `node` and checks every id it references is registered.
    pub fn check_node(&self, node: &MiddlewareNode) -> Result<(), MiddlewareError> {
        node.validate()?;
        match node.references().into_iter().find(|id| !self.contains(id)) {
            Some(id) => Err(MiddlewareError::UnknownMiddleware { id: id.clone() }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.factories.keys().map(MiddlewareId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("MiddlewareRegistry").field("ids", &ids).finish()
    }
}
