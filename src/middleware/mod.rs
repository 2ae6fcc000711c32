//! Middleware gating: declarative pass/fail checks evaluated before a handler.
//!
//! A route may carry a [`MiddlewareNode`] tree. Before the handler runs, the
//! [`MiddlewareExecutor`] walks the tree, instantiating each referenced
//! middleware through the [`MiddlewareRegistry`] and combining the
//! [`Verdict`]s it returns.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by every gate.
//! - [`Verdict`]: pass, fail, or a terminal [`Response`](crate::Response).
//! - [`MiddlewareNode`]: `Single` / `All` / `Any` / `Custom` tree.
//! - [`MiddlewareRegistry`]: maps a [`MiddlewareId`] to a factory.
//! - [`MiddlewareExecutor`]: evaluates a tree and turns a failure into a
//!   redirect or a JSON error depending on the request path.

use thiserror::Error;

use crate::Response;
use crate::context::Context;

pub mod executor;
pub mod node;
pub mod registry;

pub use executor::{MiddlewareExecutor, Outcome};
pub use node::{ListKind, MiddlewareId, MiddlewareNode};
pub use registry::MiddlewareRegistry;

/// Boxed error returned from a middleware's own logic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a single middleware check.
#[derive(Debug)]
pub enum Verdict {
    /// Continue to the next gate or the handler.
    Pass,
    /// Deny; the executor synthesizes the denial response.
    Fail,
    /// Deny with this exact response.
    Respond(Response),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl From<bool> for Verdict {
    fn from(passed: bool) -> Self {
        if passed { Verdict::Pass } else { Verdict::Fail }
    }
}

/// A request gate.
///
/// A fresh instance is built by the registry for every evaluation, so
/// implementations may keep per-request state in `self`.
///
/// # Contract
///
/// - Return `Ok(Verdict::Pass)` to let the request through.
/// - Return `Ok(Verdict::Fail)` or `Ok(Verdict::Respond(..))` to stop it.
/// - Return `Err(..)` only for genuine failures of the check itself; the
///   executor wraps them in [`MiddlewareError::Execution`].
///
/// # Examples
///
/// ```rust
/// use routegate::context::Context;
/// use routegate::middleware::{BoxError, Middleware, Verdict};
///
/// struct RequireToken;
///
/// impl Middleware for RequireToken {
///     fn check(&mut self, ctx: &mut Context) -> Result<Verdict, BoxError> {
///         Ok(ctx.request().headers().contains("x-token").into())
///     }
/// }
/// ```
pub trait Middleware: Send {
    /// Inspect the request and decide whether it may proceed.
    fn check(&mut self, ctx: &mut Context) -> Result<Verdict, BoxError>;
}

/// Middleware configuration and execution errors.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("middleware list `{kind}` must not be empty")]
    EmptyList { kind: ListKind },

    #[error("middleware list `{kind}` contains duplicate entry `{entry}`")]
    DuplicateEntry { kind: ListKind, entry: String },

    #[error("middleware list `{kind}` has a non-string entry at index {index}: {found}")]
    NonStringEntry {
        kind: ListKind,
        index: usize,
        found: String,
    },

    #[error("middleware declaration must be a string, list, or object, found {found}")]
    InvalidShape { found: &'static str },

    #[error("custom middleware branches must be keyed `all` or `any`, found `{key}`")]
    InvalidCustomKey { key: String },

    #[error("custom middleware must declare an `all` or `any` branch")]
    EmptyCustom,

    #[error("middleware `{id}` is not registered")]
    UnknownMiddleware { id: MiddlewareId },

    #[error("middleware `{middleware}` failed: {source}")]
    Execution {
        middleware: MiddlewareId,
        #[source]
        source: BoxError,
    },
}

impl MiddlewareError {
    /// `true` for errors raised while evaluating, as opposed to declaring.
    pub fn is_execution(&self) -> bool {
        matches!(self, MiddlewareError::Execution { .. })
    }
}
