//! Evaluation of middleware trees.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{MiddlewareError, MiddlewareId, MiddlewareNode, MiddlewareRegistry, Verdict};
use crate::config::RoutingConfig;
use crate::context::Context;
use crate::{Response, StatusCode};

/// What the dispatcher should do after the gate has run.
#[derive(Debug)]
pub enum Outcome {
    /// Run the handler.
    Proceed,
    /// Send this response instead.
    Halt(Response),
}

/// Evaluates [`MiddlewareNode`] trees against a request.
///
/// | Node               | Result                                                       |
/// |--------------------|--------------------------------------------------------------|
/// | `Single(id)`       | the middleware's own verdict                                 |
/// | `All(children)`    | first non-pass child, or pass                                |
/// | `Any(children)`    | pass on the first passing child, else the **last** child's verdict |
/// | `Custom{all, any}` | `all` first; if it passes, the verdict of `any`               |
///
/// Children are evaluated in listed order and never after a short-circuit.
#[derive(Debug, Clone)]
pub struct MiddlewareExecutor {
    registry: Arc<MiddlewareRegistry>,
    api_prefix: String,
    access_denied_url: String,
}

impl MiddlewareExecutor {
    pub fn new(registry: Arc<MiddlewareRegistry>, routing: &RoutingConfig) -> Self {
        Self {
            registry,
            api_prefix: routing.api_prefix.trim_end_matches('/').to_owned(),
            access_denied_url: routing.access_denied_url.clone(),
        }
    }

    pub fn registry(&self) -> &MiddlewareRegistry {
        &self.registry
    }

    /// Validates and evaluates `node`, turning a bare failure into the
    /// denial response for the request path.
    ///
    /// # Errors
    ///
    /// - A configuration variant of [`MiddlewareError`] if `node` is malformed.
    /// - [`MiddlewareError::Execution`] if a middleware's check itself errored.
    pub fn run(&self, node: &MiddlewareNode, ctx: &mut Context) -> Result<Outcome, MiddlewareError> {
        node.validate()?;
        Ok(match self.evaluate(node, ctx)? {
            Verdict::Pass => Outcome::Proceed,
            Verdict::Fail => Outcome::Halt(self.denial(ctx)),
            Verdict::Respond(response) => Outcome::Halt(response),
        })
    }

    /// Evaluates `node` without validation or denial synthesis.
    pub fn evaluate(&self, node: &MiddlewareNode, ctx: &mut Context) -> Result<Verdict, MiddlewareError> {
        match node {
            MiddlewareNode::Single(id) => self.evaluate_single(id, ctx),
            MiddlewareNode::All(children) => self.evaluate_all(children, ctx),
            MiddlewareNode::Any(children) => self.evaluate_any(children, ctx),
            MiddlewareNode::Custom { all, any } => {
                if let Some(children) = all {
                    let verdict = self.evaluate_all(children, ctx)?;
                    if !verdict.is_pass() {
                        return Ok(verdict);
                    }
                }
                match any {
                    Some(children) => self.evaluate_any(children, ctx),
                    None => Ok(Verdict::Pass),
                }
            }
        }
    }

    fn evaluate_single(&self, id: &MiddlewareId, ctx: &mut Context) -> Result<Verdict, MiddlewareError> {
        let mut middleware = self.registry.instantiate(id)?;
        let verdict = middleware
            .check(ctx)
            .map_err(|source| MiddlewareError::Execution {
                middleware: id.clone(),
                source,
            })?;
        match &verdict {
            Verdict::Pass => trace!(middleware = %id, "middleware passed"),
            _ => debug!(middleware = %id, path = %ctx.request().path(), "middleware denied request"),
        }
        Ok(verdict)
    }

    fn evaluate_all(&self, children: &[MiddlewareNode], ctx: &mut Context) -> Result<Verdict, MiddlewareError> {
        for child in children {
            let verdict = self.evaluate(child, ctx)?;
            if !verdict.is_pass() {
                return Ok(verdict);
            }
        }
        Ok(Verdict::Pass)
    }

    fn evaluate_any(&self, children: &[MiddlewareNode], ctx: &mut Context) -> Result<Verdict, MiddlewareError> {
        let mut last = Verdict::Fail;
        for child in children {
            let verdict = self.evaluate(child, ctx)?;
            if verdict.is_pass() {
                return Ok(verdict);
            }
            last = verdict;
        }
        Ok(last)
    }

    /// Response for a failed gate: JSON `403` under the API prefix, otherwise
    /// a redirect to the access-denied page.
    pub fn denial(&self, ctx: &Context) -> Response {
        if self.is_api_path(ctx.request().path()) {
            Response::api_error(StatusCode::Forbidden, "access denied")
        } else {
            Response::redirect(self.access_denied_url.as_str())
        }
    }

    pub fn is_api_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.api_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}
