//! ristretto - small embeddable HTTP/1.1 server engine
//!
//! Accepts TCP connections, frames HTTP/1.1 requests, matches them against
//! a route table with `:name` parameters, runs a middleware chain and a
//! handler, and writes exactly one response per request. Designed to be
//! dropped into a service that needs a handful of JSON endpoints without a
//! full framework.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: persistent connections, pipelining, `Content-Length` bodies
//! - **HTTP/1.0**: closes after each response unless `Connection: keep-alive`
//!
//! Chunked transfer encoding, TLS and HTTP/2 are not supported.
//!
//! # Request lifecycle
//!
//! 1. The connection reads into a growable buffer until a full frame
//!    (head plus declared body) is available.
//! 2. The query string is decoded and a [`Context`] is built.
//! 3. The [`Router`] takes the first endpoint whose template matches. When its
//!    method agrees it runs global middleware, group/endpoint middleware and
//!    the handler; otherwise the request gets `405` or the `OPTIONS` reply.
//! 4. The response is serialized with `Content-Length` and
//!    `Connection: keep-alive|close` and written.
//!
//! Malformed or oversized requests are answered with a fixed response
//! (400, 408, 413, 414, 431, 505) and the connection is closed.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use ristretto::{Context, Router, Server};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.get("/hello", |ctx: &mut Context| ctx.send_text("Hello, World!"));
//!
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .router(router)
//!         .build()
//!         .launch()
//!         .await
//!         .unwrap();
//! }
//! ```
//! Parameters, JSON and middleware:
//! ```no_run
//! use ristretto::{Chain, Context, Flow, Method, Router, Server, StatusCode};
//! use serde::{Deserialize, Serialize};
//! use tokio::net::TcpListener;
//!
//! #[derive(Deserialize, Serialize)]
//! struct User {
//!     name: String,
//! }
//!
//! fn require_token(ctx: &mut Context) -> Flow {
//!     match ctx.header("authorization") {
//!         Some(_) => Flow::Continue,
//!         None => Flow::Stop(ctx.send_error(StatusCode::Unauthorized, "missing token")),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.get("/users/:id", |ctx: &mut Context| {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.send_text(&id)
//!     });
//!
//!     let mut api = router.group("/api");
//!     api.middleware(require_token);
//!     api.route_with(
//!         Method::Post,
//!         "/users",
//!         |ctx: &mut Context| match ctx.body().deserialize::<User>() {
//!             Some(user) => ctx.status(StatusCode::Created).send_json(&user),
//!             None => ctx.send_error(StatusCode::BadRequest, "expected a user"),
//!         },
//!         Chain::new(),
//!     );
//!
//!     let server = Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .router(router)
//!         .build();
//!
//!     // stop after an hour
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!         handle.shutdown();
//!     });
//!
//!     server.launch().await.unwrap();
//! }
//! ```

pub(crate) mod http {
    pub(crate) mod framer;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod routing {
    pub(crate) mod matcher;
    pub(crate) mod middleware;
    pub(crate) mod router;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod registry;
    pub(crate) mod server_impl;
    pub(crate) mod timer;
}
mod context;
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    context::Context,
    errors::{Error, Result},
    http::{
        query,
        request::{Body, Request},
        response::{Handled, Response},
        types::{Header, Method, StatusCode, Version},
    },
    routing::{
        matcher::{match_path, PathParams},
        middleware::{Chain, Flow, Middleware},
        router::{Allow, Group, Handler, Router},
    },
    server::{
        registry::{ConnectionId, ConnectionInfo, ConnectionRegistry},
        server_impl::{Server, ServerBuilder, ServerHandle},
    },
};
