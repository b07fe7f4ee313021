use crate::{
    errors::{Error, ErrorKind, Result},
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    routing::router::Router,
    server::{
        connection::{writer, HttpConnection},
        registry::ConnectionRegistry,
    },
};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Notify,
    task::{yield_now, JoinSet},
    time::{sleep as tokio_sleep, timeout},
};

/// An HTTP server that serves one [`Router`] on one listener.
///
/// A fixed pool of workers (see [`ServerLimits`]) pulls accepted
/// connections from a queue. When the queue is full, new connections get a
/// 503 and are closed.
///
/// # Examples
///
/// ```no_run
/// use ristretto::{Context, Router, Server};
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() {
///     let mut router = Router::new();
///     router.get("/hello", |ctx: &mut Context| ctx.send_text("Hello, World!"));
///
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .router(router)
///         .build()
///         .launch()
///         .await
///         .unwrap();
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    limits: AllLimits,

    registry: ConnectionRegistry,
    shutdown: Arc<Shutdown>,
}

impl Server {
    /// Starts a [`ServerBuilder`].
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            router: None,

            server_limits: None,
            connection_limits: None,
            request_limits: None,
            response_limits: None,
        }
    }

    /// Binds a listener with `SO_REUSEADDR` and the backlog from `limits`.
    ///
    /// # Panics
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> ristretto::Result<()> {
    /// use ristretto::{limits::ServerLimits, Router, Server};
    ///
    /// let limits = ServerLimits {
    ///     backlog: 4096,
    ///     ..ServerLimits::default()
    /// };
    /// let listener = Server::bind("0.0.0.0:8080".parse().unwrap(), &limits)?;
    ///
    /// Server::builder()
    ///     .listener(listener)
    ///     .router(Router::new())
    ///     .server_limits(limits)
    ///     .build()
    ///     .launch()
    ///     .await
    /// # }
    /// ```
    pub fn bind(addr: SocketAddr, limits: &ServerLimits) -> Result<TcpListener> {
        let bind = || -> std::io::Result<TcpListener> {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
            socket.set_reuse_address(true)?;
            socket.set_nonblocking(true)?;
            socket.bind(&addr.into())?;
            socket.listen(limits.backlog)?;

            TcpListener::from_std(socket.into())
        };

        bind().map_err(|source| Error::Bind { addr, source })
    }

    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle to stop the server and inspect its connections.
    #[inline]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Accepts and serves connections until [`ServerHandle::shutdown`].
    ///
    /// On shutdown the listener is closed first, then every live connection
    /// is asked to close; workers get [`ServerLimits::shutdown_timeout`] to
    /// finish before they are aborted.
    ///
    /// ```no_run
    /// use ristretto::{Router, Server};
    /// use tokio::net::TcpListener;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let server = Server::builder()
    ///     .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
    ///     .router(Router::new())
    ///     .build();
    ///
    /// let handle = server.handle();
    /// let running = tokio::spawn(server.launch());
    ///
    /// handle.shutdown();
    /// running.await.unwrap().unwrap();
    /// # }
    /// ```
    pub async fn launch(self) -> Result<()> {
        let Server {
            listener,
            router,
            limits,
            registry,
            shutdown,
        } = self;

        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());
        let mut workers = JoinSet::new();

        for _ in 0..limits.0.max_connections {
            workers.spawn(Self::worker(
                stream_queue.clone(),
                router.clone(),
                limits.clone(),
                registry.clone(),
                shutdown.clone(),
            ));
        }
        workers.spawn(Self::alarmist(
            error_queue.clone(),
            limits.clone(),
            shutdown.clone(),
        ));

        tracing::info!(
            addr = %listener.local_addr()?,
            workers = limits.0.max_connections,
            "server listening"
        );

        while !shutdown.is_set() {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.notify.notified() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok(value) => match stream_queue.len() < limits.0.max_pending_connections {
                    true => stream_queue.push(value),
                    false => {
                        tracing::warn!(peer = %value.1, "pending queue full, rejecting");
                        error_queue.push(value);
                    }
                },
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            }
        }

        drop(listener);
        tracing::info!(live = registry.len(), "shutting down");
        registry.close_all();

        let drained = timeout(limits.0.shutdown_timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(live = registry.len(), "shutdown timeout reached, aborting workers");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn worker(
        queue: TcpQueue,
        router: Arc<Router>,
        limits: AllLimits,
        registry: ConnectionRegistry,
        shutdown: Arc<Shutdown>,
    ) {
        let mut conn = HttpConnection::new(router, &limits);

        while let Some((mut stream, peer)) =
            Self::get_stream(&queue, &limits.0.wait_strategy, &shutdown).await
        {
            let guard = registry.register(peer);
            conn.run(&mut stream, peer, &guard).await;
        }
    }

    // Answers connections that did not fit in the pending queue.
    async fn alarmist(queue: TcpQueue, limits: AllLimits, shutdown: Arc<Shutdown>) {
        let (server_limits, conn_limits, ..) = limits;
        let Some(response) = ErrorKind::ServiceUnavailable.canned() else {
            return;
        };

        while let Some((mut stream, peer)) =
            Self::get_stream(&queue, &server_limits.wait_strategy, &shutdown).await
        {
            if let Err(err) =
                writer::write_bytes(&mut stream, response, conn_limits.socket_write_timeout).await
            {
                tracing::debug!(%peer, error = %err, "503 not delivered");
            }
        }
    }

    #[inline]
    async fn get_stream(
        queue: &TcpQueue,
        wait: &WaitStrategy,
        shutdown: &Shutdown,
    ) -> Option<(TcpStream, SocketAddr)> {
        loop {
            if shutdown.is_set() {
                return None;
            }

            if let Some(value) = queue.pop() {
                return Some(value);
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}

//

/// Assembles a [`Server`].
///
/// `listener` and `router` are required; every limit group left unset keeps
/// its `Default`.
///
/// ```no_run
/// # #[tokio::main]
/// # async fn main() {
/// use ristretto::{
///     limits::{ConnLimits, ReqLimits, ServerLimits},
///     Router, Server,
/// };
/// use std::time::Duration;
/// use tokio::net::TcpListener;
///
/// let server = Server::builder()
///     .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///     .router(Router::new())
///     .server_limits(ServerLimits {
///         max_connections: 16,
///         shutdown_timeout: Duration::from_secs(10),
///         ..ServerLimits::default()
///     })
///     .connection_limits(ConnLimits {
///         request_timeout: Duration::from_secs(30),
///         ..ConnLimits::default()
///     })
///     .request_limits(ReqLimits {
///         body_size: 64 * 1024,
///         ..ReqLimits::default()
///     })
///     .build();
/// # drop(server);
/// # }
/// ```
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    router: Option<Router>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
}

impl ServerBuilder {
    /// Required. [`Server::bind`] builds one with a custom backlog.
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Required. The table is frozen once the server is built.
    #[inline(always)]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Configures workers, queueing and shutdown.
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection timeouts and the request ceiling.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures response buffers and the header limit.
    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// # Panics
    ///
    /// When `listener` or `router` was never called.
    #[inline]
    #[track_caller]
    pub fn build(self) -> Server {
        let listener = self
            .listener
            .expect("`ServerBuilder::listener` was not called");
        let router = self
            .router
            .expect("`ServerBuilder::router` was not called");

        tracing::debug!(routes = router.len(), "server built");
        Server {
            listener,
            router: Arc::new(router),
            limits: (
                self.server_limits.unwrap_or_default(),
                self.connection_limits.unwrap_or_default(),
                self.request_limits.unwrap_or_default(),
                self.response_limits.unwrap_or_default(),
            ),

            registry: ConnectionRegistry::new(),
            shutdown: Arc::new(Shutdown::default()),
        }
    }
}

/// Controls a running [`Server`] from anywhere.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<Shutdown>,
    registry: ConnectionRegistry,
}

impl ServerHandle {
    /// Stops accepting and closes every connection. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.flag.swap(true, Ordering::AcqRel) {
            tracing::info!("shutdown requested");
        }
        self.shutdown.notify.notify_one();
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_set()
    }

    #[inline(always)]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("shutdown", &self.is_shutdown())
            .field("connections", &self.registry)
            .finish()
    }
}

#[derive(Default)]
struct Shutdown {
    flag: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    #[inline(always)]
    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;
pub(crate) type AllLimits = (ServerLimits, ConnLimits, ReqLimits, RespLimits);
