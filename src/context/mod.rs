//! Per-request context: the request, the route it matched, and typed state.
//!
//! A [`Context`] is created by the dispatcher once a route has matched and is
//! threaded by `&mut` through every middleware and then by value into the
//! handler. Nothing about the "current route" lives in global state.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::Request;
use crate::http::Method;
use crate::router::RouteParams;

/// Type-erased per-request state, keyed by type.
///
/// Middleware use it to hand data (an authenticated user, a tenant) to the
/// handler without either side knowing the other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions").field("len", &self.map.len()).finish()
    }
}

/// The route a request was dispatched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRoute {
    pub name: String,
    pub method: Method,
    /// URL template, e.g. `/users/{id}`.
    pub url: String,
}

/// Per-request context.
#[derive(Debug)]
pub struct Context {
    request: Request,
    route: Option<CurrentRoute>,
    params: RouteParams,
    extensions: Extensions,
}

impl Context {
    /// A context that has not been matched to a route.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            route: None,
            params: RouteParams::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn for_route(request: Request, route: CurrentRoute, params: RouteParams) -> Self {
        Self {
            request,
            route: Some(route),
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn route(&self) -> Option<&CurrentRoute> {
        self.route.as_ref()
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Decodes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
