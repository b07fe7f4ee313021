//! Middleware chains.

use crate::{context::Context, http::response::Handled};
use std::sync::Arc;

/// What a middleware decided for the current request.
#[derive(Debug)]
pub enum Flow {
    /// Run the next middleware, then the handler.
    Continue,
    /// Skip everything after this: the response has been produced.
    Stop(Handled),
}

/// A step that runs before the route handler.
///
/// Any `Fn(&mut Context) -> Flow` is a middleware:
/// ```
/// use ristretto::{Chain, Context, Flow, StatusCode};
///
/// let auth = |ctx: &mut Context| match ctx.header("authorization") {
///     Some(_) => Flow::Continue,
///     None => Flow::Stop(ctx.send_error(StatusCode::Unauthorized, "missing token")),
/// };
///
/// let chain = Chain::new().then(auth);
/// assert_eq!(chain.len(), 1);
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn process(&self, ctx: &mut Context) -> Flow;
}

impl<F> Middleware for F
where
    F: Fn(&mut Context) -> Flow + Send + Sync + 'static,
{
    #[inline]
    fn process(&self, ctx: &mut Context) -> Flow {
        self(ctx)
    }
}

/// An ordered list of middleware, run first to last.
#[derive(Clone, Default)]
pub struct Chain(Vec<Arc<dyn Middleware>>);

impl Chain {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware, builder style.
    #[inline]
    pub fn then<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(middleware);
        self
    }

    #[inline]
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        self.0.push(Arc::new(middleware));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &dyn Middleware> {
        self.0.iter().map(|m| m.as_ref())
    }

    /// `self` followed by `other`.
    pub(crate) fn joined(&self, other: &Chain) -> Chain {
        let mut chain = Vec::with_capacity(self.len() + other.len());
        chain.extend(self.0.iter().cloned());
        chain.extend(other.0.iter().cloned());
        Chain(chain)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Chain").field(&self.0.len()).finish()
    }
}
