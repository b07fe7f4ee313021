//! Route table and dispatch.

use crate::{
    context::Context,
    http::{response::Handled, types::Method},
    routing::{
        matcher::match_path,
        middleware::{Chain, Flow, Middleware},
    },
};
use std::{fmt, sync::Arc};

/// Produces the response for a matched route.
///
/// Any `Fn(&mut Context) -> Handled` is a handler. Closures need the
/// argument type spelled out so the borrow is inferred correctly:
/// ```
/// use ristretto::{Context, Router};
///
/// let mut router = Router::new();
/// router.get("/users/:id", |ctx: &mut Context| {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.send_text(&id)
/// });
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context) -> Handled;
}

impl<F> Handler for F
where
    F: Fn(&mut Context) -> Handled + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, ctx: &mut Context) -> Handled {
        self(ctx)
    }
}

struct Endpoint {
    method: Method,
    template: String,
    handler: Arc<dyn Handler>,
    chain: Chain,
}

/// Ordered route table with global middleware.
///
/// Endpoints are tried in registration order and the first one whose
/// template matches the path decides the outcome: its handler runs when the
/// method agrees, otherwise the request gets `405` (or the synthesized
/// `OPTIONS` reply). A later endpoint on the same path with another method is
/// therefore never reached; register one endpoint per path and branch on
/// [`Context::method`] when several methods share it. Registration happens
/// before the server starts, after that the router is shared read-only
/// between workers.
///
/// # Examples
/// ```
/// use ristretto::{Context, Flow, Router};
///
/// let mut router = Router::new();
/// router
///     .middleware(|ctx: &mut Context| {
///         ctx.set_header("X-Served-By", "ristretto");
///         Flow::Continue
///     })
///     .get("/", |ctx: &mut Context| ctx.send_text("Hello, World!"))
///     .post("/echo", |ctx: &mut Context| {
///         let body = ctx.body().as_text().unwrap_or_default().to_owned();
///         ctx.send_text(&body)
///     });
///
/// let mut api = router.group("/api");
/// api.get("/status", |ctx: &mut Context| ctx.send_text("ok"));
///
/// assert_eq!(router.allow("/").to_string(), "GET, HEAD, OPTIONS");
/// assert_eq!(router.allow("/api/status").to_string(), "GET, HEAD, OPTIONS");
/// ```
#[derive(Default)]
pub struct Router {
    global: Chain,
    endpoints: Vec<Endpoint>,
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware run before every endpoint, in registration order.
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.global.push(middleware);
        self
    }

    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.route_with(method, path, handler, Chain::new())
    }

    /// Registers an endpoint with its own middleware, run after the global chain.
    pub fn route_with<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
        chain: Chain,
    ) -> &mut Self {
        let template = match path.starts_with('/') {
            true => path.to_owned(),
            false => format!("/{path}"),
        };

        tracing::debug!(%method, path = template.as_str(), "route registered");
        self.endpoints.push(Endpoint {
            method,
            template,
            handler: Arc::new(handler),
            chain,
        });
        self
    }

    #[inline]
    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Get, path, handler)
    }

    #[inline]
    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Post, path, handler)
    }

    #[inline]
    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Put, path, handler)
    }

    #[inline]
    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Patch, path, handler)
    }

    #[inline]
    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Delete, path, handler)
    }

    /// Opens a group of endpoints sharing a path prefix and middleware.
    pub fn group(&mut self, root: &str) -> Group<'_> {
        Group {
            router: self,
            root: root.trim_end_matches('/').to_owned(),
            chain: Chain::new(),
        }
    }

    /// Methods of every endpoint whose template matches `target`, so
    /// `/users/:id` contributes to `/users/7` alongside any literal
    /// `/users/7` route.
    ///
    /// Registration order, without duplicates; `HEAD` follows when `GET` is
    /// present and `OPTIONS` is always last.
    pub fn allow(&self, target: &str) -> Allow {
        let mut methods = Vec::new();

        for endpoint in &self.endpoints {
            if endpoint.method != Method::Options
                && !methods.contains(&endpoint.method)
                && match_path(&endpoint.template, target).is_some()
            {
                methods.push(endpoint.method);
            }
        }

        if methods.contains(&Method::Get) && !methods.contains(&Method::Head) {
            methods.push(Method::Head);
        }
        methods.push(Method::Options);

        Allow(methods)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Outcome of routing one request.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Handled,
    Options(Allow),
    MethodNotAllowed(Allow),
    NotFound,
}

impl Router {
    // The first endpoint whose template matches decides, unless it is a `GET`
    // answering a `HEAD`: that one runs and the scan goes on, so a `HEAD` may
    // run several `GET` handlers. Only the first response reaches the wire
    // since a sent response ignores further changes.
    pub(crate) fn dispatch(&self, ctx: &mut Context) -> Dispatch {
        let method = ctx.method();
        let mut head_ran = false;

        for endpoint in &self.endpoints {
            let Some(params) = match_path(&endpoint.template, ctx.request().target()) else {
                continue;
            };

            if endpoint.method == method {
                ctx.request_mut().set_params(params);
                let _ = self.run(endpoint, ctx);
                return Dispatch::Handled;
            }

            if method == Method::Head && endpoint.method == Method::Get {
                ctx.request_mut().set_params(params);
                ctx.request_mut().clear_body();
                let _ = self.run(endpoint, ctx);
                head_ran = true;
                continue;
            }

            let allow = self.allow(ctx.request().target());
            return match method {
                Method::Options => Dispatch::Options(allow),
                _ => Dispatch::MethodNotAllowed(allow),
            };
        }

        match head_ran {
            true => Dispatch::Handled,
            false => Dispatch::NotFound,
        }
    }

    fn run(&self, endpoint: &Endpoint, ctx: &mut Context) -> Handled {
        for middleware in self.global.iter().chain(endpoint.chain.iter()) {
            if let Flow::Stop(handled) = middleware.process(ctx) {
                return handled;
            }
        }

        endpoint.handler.handle(ctx)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for endpoint in &self.endpoints {
            list.entry(&format!("{} {}", endpoint.method, endpoint.template));
        }
        list.finish()
    }
}

/// Endpoints registered under a common prefix.
///
/// Group middleware applies to endpoints registered after it, and runs
/// after the router's global middleware.
pub struct Group<'a> {
    router: &'a mut Router,
    root: String,
    chain: Chain,
}

impl Group<'_> {
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.chain.push(middleware);
        self
    }

    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.route_with(method, path, handler, Chain::new())
    }

    pub fn route_with<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
        chain: Chain,
    ) -> &mut Self {
        let path = format!("{}/{}", self.root, path.trim_start_matches('/'));
        let chain = self.chain.joined(&chain);

        self.router.route_with(method, &path, handler, chain);
        self
    }

    #[inline]
    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Get, path, handler)
    }

    #[inline]
    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Post, path, handler)
    }

    #[inline]
    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Put, path, handler)
    }

    #[inline]
    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Patch, path, handler)
    }

    #[inline]
    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Delete, path, handler)
    }
}

/// Methods allowed for a path, as sent in the `Allow` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allow(Vec<Method>);

impl Allow {
    #[inline]
    pub fn contains(&self, method: Method) -> bool {
        self.0.contains(&method)
    }

    #[inline]
    pub fn methods(&self) -> &[Method] {
        &self.0
    }
}

impl fmt::Display for Allow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, method) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(method.as_str())?;
        }
        Ok(())
    }
}
