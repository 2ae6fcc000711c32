//! Route declarations and the validated route record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::params::{ParamType, ParamTypeRejection};
use crate::cache::CacheError;
use crate::http::Method;
use crate::middleware::{MiddlewareError, MiddlewareNode, MiddlewareRegistry};

/// Route-table configuration errors. Any of these aborts table building.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route `{route}`: unsupported HTTP method `{method}`")]
    InvalidMethod { route: String, method: String },

    #[error("route `{route}`: malformed placeholder `{segment}` in `{url}`")]
    InvalidPlaceholder {
        route: String,
        url: String,
        segment: String,
    },

    #[error("route `{route}`: placeholder `{{{param}}}` appears more than once")]
    DuplicatePlaceholder { route: String, param: String },

    #[error("route `{route}`: parameter `{param}` has union type `{declared}`")]
    UnionParameter {
        route: String,
        param: String,
        declared: String,
    },

    #[error("route `{route}`: parameter `{param}` has unsupported type `{declared}` (expected string, int, or float)")]
    UnsupportedParameterType {
        route: String,
        param: String,
        declared: String,
    },

    #[error("route `{route}`: handler parameter `{param}` has no placeholder in `{url}`")]
    UnboundParameter {
        route: String,
        param: String,
        url: String,
    },

    #[error("duplicate route name `{name}`")]
    DuplicateName { name: String },

    #[error("duplicate route {method} {url}")]
    DuplicateRoute { method: Method, url: String },

    #[error("route `{route}`: no handler registered for `{handler}`")]
    MissingHandler { route: String, handler: String },

    #[error("route `{route}`: {source}")]
    Middleware {
        route: String,
        #[source]
        source: MiddlewareError,
    },

    #[error("route table cache: {0}")]
    Cache(#[from] CacheError),
}

/// Where a route's middleware comes from.
#[derive(Debug, Clone)]
enum MiddlewareSource {
    Node(MiddlewareNode),
    Declaration(Value),
}

/// A route as declared by application code, before validation.
///
/// # Examples
///
/// ```rust
/// use routegate::router::RouteDefinition;
///
/// let def = RouteDefinition::get("/users/{id}", "UserController::show")
///     .name("user_show")
///     .param("id", "int");
/// assert_eq!(def.route_name(), "user_show");
/// ```
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    method: String,
    url: String,
    handler: String,
    name: Option<String>,
    middleware: Option<MiddlewareSource>,
    params: Vec<(String, String)>,
}

impl RouteDefinition {
    /// Declares a route for `method` (validated at build time).
    ///
    /// `handler` is an opaque reference such as `"UserController::show"`; it
    /// is the key handlers are bound under.
    pub fn new(method: impl Into<String>, url: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            handler: handler.into(),
            name: None,
            middleware: None,
            params: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new("GET", url, handler)
    }

    pub fn post(url: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new("POST", url, handler)
    }

    pub fn put(url: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new("PUT", url, handler)
    }

    pub fn patch(url: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new("PATCH", url, handler)
    }

    pub fn delete(url: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::new("DELETE", url, handler)
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn middleware(mut self, node: impl Into<MiddlewareNode>) -> Self {
        self.middleware = Some(MiddlewareSource::Node(node.into()));
        self
    }

    /// Middleware given as a JSON declaration (see [`MiddlewareNode::from_declaration`]).
    #[must_use]
    pub fn middleware_declaration(mut self, declaration: Value) -> Self {
        self.middleware = Some(MiddlewareSource::Declaration(declaration));
        self
    }

    /// Declares the handler's type for parameter `name`.
    ///
    /// Placeholders without a declaration are passed through as strings.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.params.push((name.into(), declared_type.into()));
        self
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Explicit name, or the method part of the handler reference.
    pub fn route_name(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self
                .handler
                .rsplit_once("::")
                .map_or(self.handler.as_str(), |(_, method)| method),
        }
    }

    /// Validates the declaration and produces the immutable [`Route`].
    pub fn build(&self, registry: &MiddlewareRegistry) -> Result<Route, RouteError> {
        let name = self.route_name().to_owned();

        let method: Method = self.method.parse().map_err(|_| RouteError::InvalidMethod {
            route: name.clone(),
            method: self.method.clone(),
        })?;

        let url = normalize_path(&self.url);
        let params = placeholders(&name, &url)?;

        let mut param_types = vec![ParamType::String; params.len()];
        for (param, declared) in &self.params {
            let ty = ParamType::from_declaration(declared).map_err(|rejection| match rejection {
                ParamTypeRejection::Union => RouteError::UnionParameter {
                    route: name.clone(),
                    param: param.clone(),
                    declared: declared.clone(),
                },
                ParamTypeRejection::Unsupported => RouteError::UnsupportedParameterType {
                    route: name.clone(),
                    param: param.clone(),
                    declared: declared.clone(),
                },
            })?;
            let position = params.iter().position(|p| p == param).ok_or_else(|| {
                RouteError::UnboundParameter {
                    route: name.clone(),
                    param: param.clone(),
                    url: url.clone(),
                }
            })?;
            param_types[position] = ty;
        }

        let middleware = match &self.middleware {
            None => None,
            Some(MiddlewareSource::Node(node)) => Some(node.clone()),
            Some(MiddlewareSource::Declaration(value)) => Some(
                MiddlewareNode::from_declaration(value).map_err(|source| RouteError::Middleware {
                    route: name.clone(),
                    source,
                })?,
            ),
        };
        if let Some(node) = &middleware {
            registry
                .check_node(node)
                .map_err(|source| RouteError::Middleware {
                    route: name.clone(),
                    source,
                })?;
        }

        Ok(Route {
            name,
            method,
            url,
            handler: self.handler.clone(),
            middleware,
            params,
            param_types,
        })
    }
}

/// A validated, immutable route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    name: String,
    method: Method,
    url: String,
    handler: String,
    middleware: Option<MiddlewareNode>,
    params: Vec<String>,
    param_types: Vec<ParamType>,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Normalized URL template.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn middleware(&self) -> Option<&MiddlewareNode> {
        self.middleware.as_ref()
    }

    /// Placeholder names in template order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param_types(&self) -> &[ParamType] {
        &self.param_types
    }

    pub fn is_parametric(&self) -> bool {
        !self.params.is_empty()
    }
}

/// Normalizes a URL template or request path: one leading `/`, no trailing
/// `/` except for the root, and `/` for an empty path.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Placeholder name if `segment` is exactly `{name}`.
pub(crate) fn placeholder_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

fn placeholders(route: &str, url: &str) -> Result<Vec<String>, RouteError> {
    let mut names: Vec<String> = Vec::new();
    for segment in url.split('/').skip(1) {
        let name = match placeholder_name(segment) {
            Some(name) if is_valid_param_name(name) => name,
            Some(_) => return Err(invalid_placeholder(route, url, segment)),
            None if segment.contains(['{', '}']) => {
                return Err(invalid_placeholder(route, url, segment));
            }
            None => continue,
        };
        if names.iter().any(|n| n == name) {
            return Err(RouteError::DuplicatePlaceholder {
                route: route.to_owned(),
                param: name.to_owned(),
            });
        }
        names.push(name.to_owned());
    }
    Ok(names)
}

fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid_placeholder(route: &str, url: &str, segment: &str) -> RouteError {
    RouteError::InvalidPlaceholder {
        route: route.to_owned(),
        url: url.to_owned(),
        segment: segment.to_owned(),
    }
}
