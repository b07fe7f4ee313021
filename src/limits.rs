//! Limits and timeouts, grouped by the layer that enforces them.
//!
//! The defaults suit a small internal JSON service: tight header limits, a
//! request deadline that cuts off slow clients and a bounded accept queue.
//!
//! # Memory
//!
//! Each active connection owns one read buffer that starts at
//! [`ReqLimits::initial_buffer`] and doubles on demand, never growing past
//! [`ReqLimits::buffer_ceiling`]. Responses are serialized into a buffer sized by
//! [`RespLimits`].
//!
//! # Examples
//!
//! ```no_run
//! use ristretto::{Context, Router, Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use tokio::net::TcpListener;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.get("/", |ctx: &mut Context| ctx.send_text("Hello world!"));
//!
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .router(router)
//!         .server_limits(ServerLimits {
//!             max_connections: 5000, // Higher concurrency
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             request_timeout: Duration::from_secs(10),
//!             max_requests_per_connection: 10_000,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 18,      // Fewer headers for internal APIs
//!             body_size: 16 * 1024,  // 16KB for JSON payloads
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await
//!         .unwrap();
//! }
//! ```

use std::time::Duration;

/// Worker pool, admission queue and shutdown settings.
///
/// # Admission
/// ```text
///  accept ──▶ pending queue ──▶ worker 1..=max_connections ──▶ HttpConnection
///                 │
///                 └─ queue holds max_pending_connections ──▶ canned 503, close
/// ```
///
/// Every worker is spawned at launch and lives until shutdown. An idle worker
/// polls the queue with [`wait_strategy`](ServerLimits::wait_strategy); a busy
/// one serves a single connection to its end and reuses its read buffer for
/// the next.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of connections served at the same time (default: `100`).
    ///
    /// Exactly `max_connections` workers are spawned at launch.
    pub max_connections: usize,

    /// Maximum number of accepted connections waiting for a worker (default: `250`).
    ///
    /// When the queue is full, new connections receive an immediate
    /// `503 Service Unavailable` and are closed.
    pub max_pending_connections: usize,

    /// How idle workers wait on an empty queue (default: `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    /// Listen backlog used by [`Server::bind`](crate::Server::bind) (default: `1024`).
    pub backlog: i32,

    /// How long shutdown waits for live connections to finish (default: `5s`).
    ///
    /// Workers still running after this are aborted.
    pub shutdown_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            backlog: 1024,
            shutdown_timeout: Duration::from_secs(5),

            _priv: (),
        }
    }
}

/// What an idle worker does between polls of an empty queue.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// [`tokio::task::yield_now()`]. Lowest pickup latency, one core stays busy.
    Yield,

    /// [`tokio::time::sleep()`] for the given period.
    Sleep(Duration),
}

/// Per-connection lifecycle limits.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Time allowed for a complete request to arrive (default: `5s`).
    ///
    /// The timer starts when the connection is accepted and restarts after
    /// each keep-alive response. It is not extended by partial reads: a client
    /// trickling bytes is cut off with `408 Request Timeout`.
    pub request_timeout: Duration,

    /// Maximum time spent writing one response (default: `3s`).
    pub socket_write_timeout: Duration,

    /// Maximum requests served on one keep-alive connection (default: `500`).
    ///
    /// The response to the last allowed request carries `Connection: close`.
    pub max_requests_per_connection: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            socket_write_timeout: Duration::from_secs(3),
            max_requests_per_connection: 500,

            _priv: (),
        }
    }
}

/// Request size limits.
///
/// # Memory allocation strategy
/// The read buffer starts at `initial_buffer` bytes and doubles whenever it
/// fills, up to [`buffer_ceiling`](ReqLimits::buffer_ceiling). A request that
/// would need more is rejected with `413 Payload Too Large`.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum request target length in bytes, query included (default: `255`).
    pub url_size: usize,
    /// Maximum decoded query parameters (default: `64`).
    pub query_parts: usize,

    /// Maximum number of header lines (default: `32`).
    pub header_count: usize,
    /// Maximum size of the request line plus headers, terminator included (default: `8 KiB`).
    pub header_size: usize,

    /// Maximum declared `Content-Length` (default: `1 MiB`).
    pub body_size: usize,

    /// Initial read buffer capacity (default: `2048`).
    pub initial_buffer: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            url_size: 255,
            query_parts: 64,

            header_count: 32,
            header_size: 8 * 1024,

            body_size: 1024 * 1024,

            initial_buffer: 2048,

            _priv: (),
        }
    }
}

impl ReqLimits {
    /// The largest read buffer a connection may hold.
    #[inline(always)]
    pub const fn buffer_ceiling(&self) -> usize {
        self.header_size.saturating_add(self.body_size)
    }
}

/// Response limits.
///
/// # Buffer management
/// Serialized responses are written into a per-request buffer that starts at
/// `default_capacity`.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Maximum headers a handler may set (default: `32`).
    ///
    /// Further headers are dropped with a warning.
    pub header_count: usize,

    /// Initial capacity of the response buffer (default: `1024`).
    pub default_capacity: usize,

    /// Buffers that grew beyond this are released rather than kept (default: `8 KiB`).
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            header_count: 32,
            default_capacity: 1024,
            max_capacity: 8 * 1024,

            _priv: (),
        }
    }
}
