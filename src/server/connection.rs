use crate::{
    context::Context,
    errors::ErrorKind,
    http::{
        framer::{Framer, ReadBuffer},
        request::Request,
        response::Response,
        types::StatusCode,
    },
    limits::{ConnLimits, ReqLimits, RespLimits},
    routing::router::{Dispatch, Router},
    server::{registry::ConnectionGuard, server_impl::AllLimits, timer::TimeoutSupervisor},
};
use std::{io, mem, net::SocketAddr, sync::Arc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Serves connections one after another; owned by a single worker so its
/// buffers are reused across connections.
pub(crate) struct HttpConnection {
    router: Arc<Router>,

    buffer: ReadBuffer,
    framer: Framer,
    spare_response: Vec<u8>,

    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    resp_limits: RespLimits,
}

enum State {
    Reading,
    Dispatching(Box<Request>),
    Resetting,
    Closing,
}

enum Event {
    Shutdown,
    Timeout,
    Read(io::Result<usize>),
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(router: Arc<Router>, limits: &AllLimits) -> Self {
        let (_, conn_limits, req_limits, resp_limits) = limits.clone();

        Self {
            router,

            buffer: ReadBuffer::new(&req_limits),
            framer: Framer::new(&req_limits),
            spare_response: Vec::with_capacity(resp_limits.default_capacity),

            conn_limits,
            req_limits,
            resp_limits,
        }
    }

    /// Drives one connection until it closes.
    pub(crate) async fn run<S>(&mut self, stream: &mut S, peer: SocketAddr, guard: &ConnectionGuard)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut timer = TimeoutSupervisor::new(self.conn_limits.request_timeout);
        let mut state = State::Reading;
        let mut served = 0;

        tracing::debug!(id = %guard.id(), %peer, "connection opened");

        loop {
            state = match state {
                State::Reading => self.read(stream, &mut timer, guard).await,
                State::Dispatching(request) => {
                    served += 1;
                    self.dispatch(stream, *request, peer, served).await
                }
                State::Resetting => {
                    self.framer.reset();
                    timer.rearm();
                    State::Reading
                }
                State::Closing => break,
            };
        }

        timer.disarm();
        self.framer.reset();
        self.buffer.release();

        tracing::debug!(id = %guard.id(), served, "connection closed");
    }

    async fn read<S>(
        &mut self,
        stream: &mut S,
        timer: &mut TimeoutSupervisor,
        guard: &ConnectionGuard,
    ) -> State
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match self.framer.advance(&mut self.buffer) {
                Ok(Some(request)) => return State::Dispatching(Box::new(request)),
                Ok(None) => {}
                Err(err) => {
                    self.reject(stream, err).await;
                    return State::Closing;
                }
            }

            let spare = match self.buffer.spare() {
                Ok(spare) => spare,
                Err(err) => {
                    self.reject(stream, err).await;
                    return State::Closing;
                }
            };

            let event = tokio::select! {
                biased;
                _ = guard.closed() => Event::Shutdown,
                _ = timer.expired() => Event::Timeout,
                read = stream.read(spare) => Event::Read(read),
            };

            match event {
                Event::Read(Ok(0)) => return State::Closing,
                Event::Read(Ok(n)) => self.buffer.advance(n),
                Event::Read(Err(err)) => {
                    self.reject(stream, err.into()).await;
                    return State::Closing;
                }
                Event::Timeout => {
                    self.reject(stream, ErrorKind::Timeout).await;
                    return State::Closing;
                }
                Event::Shutdown => {
                    tracing::debug!(id = %guard.id(), "closing for shutdown");
                    return State::Closing;
                }
            }
        }
    }

    async fn dispatch<S>(
        &mut self,
        stream: &mut S,
        mut request: Request,
        peer: SocketAddr,
        served: usize,
    ) -> State
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        request.client_addr = peer;
        let keep_alive =
            request.is_keep_alive() && served < self.conn_limits.max_requests_per_connection;

        tracing::trace!(method = %request.method(), target = request.target(), "dispatching");

        let buffer = mem::take(&mut self.spare_response);
        let mut ctx = match Context::new(
            request,
            &self.resp_limits,
            buffer,
            self.req_limits.query_parts,
        ) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.reject(stream, err).await;
                return State::Closing;
            }
        };
        if !keep_alive {
            ctx.close();
        }

        match self.router.dispatch(&mut ctx) {
            Dispatch::Handled => {}
            Dispatch::NotFound => {
                let _ = ctx.status(StatusCode::NotFound).send_text("404 Not Found");
            }
            Dispatch::MethodNotAllowed(allow) => {
                let _ = ctx
                    .status(StatusCode::MethodNotAllowed)
                    .set_header("Allow", allow)
                    .send_text("Method Not Allowed");
            }
            Dispatch::Options(allow) => {
                let _ = ctx.set_header("Allow", allow).send_empty();
            }
        }

        let response = ctx.into_response();
        let keep_alive = response.is_keep_alive();
        let written = writer::write_bytes(
            stream,
            response.buffer(),
            self.conn_limits.socket_write_timeout,
        )
        .await;
        self.spare_response = response.into_buffer();

        match (written, keep_alive) {
            (Err(err), _) => {
                tracing::debug!(error = %ErrorKind::from(err), "response not delivered");
                State::Closing
            }
            (Ok(()), true) => State::Resetting,
            (Ok(()), false) => State::Closing,
        }
    }

    async fn reject<S>(&mut self, stream: &mut S, err: ErrorKind)
    where
        S: AsyncWrite + Unpin,
    {
        tracing::debug!(error = %err, "request rejected");
        let timeout = self.conn_limits.socket_write_timeout;

        let result = match err {
            ErrorKind::UnknownMethod(target) => {
                let mut response =
                    Response::with_buffer(&self.resp_limits, mem::take(&mut self.spare_response));
                let _ = response
                    .status(StatusCode::MethodNotAllowed)
                    .set_header("Allow", self.router.allow(&target))
                    .close()
                    .finish(Some("text/plain"), b"Method Not Allowed");

                let result = writer::write_bytes(stream, response.buffer(), timeout).await;
                self.spare_response = response.into_buffer();
                result
            }
            other => match other.canned() {
                Some(bytes) => writer::write_bytes(stream, bytes, timeout).await,
                None => Ok(()),
            },
        };

        if let Err(err) = result {
            tracing::debug!(error = %err, "error response not delivered");
        }
    }
}

pub(crate) mod writer {
    use std::{io, time::Duration};
    use tokio::{
        io::{AsyncWrite, AsyncWriteExt},
        time::timeout,
    };

    #[inline(always)]
    pub(crate) async fn write_bytes<S: AsyncWrite + Unpin>(
        stream: &mut S,
        bytes: &[u8],
        limit: Duration,
    ) -> Result<(), io::Error> {
        timeout(limit, stream.write_all(bytes)).await?
    }
}
