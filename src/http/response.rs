//! Outgoing response state and serialization.

use crate::{
    http::types::{self, Header, StatusCode},
    limits::RespLimits,
};

/// The response being built for the current request.
///
/// Status and headers can be set in any order until one of the `send_*`
/// methods on [`Context`](crate::Context) serializes it. Exactly one response
/// is written per request: once sent, every further change is ignored.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<Header>,
    header_limit: usize,
    keep_alive: bool,
    head_only: bool,

    buffer: Vec<u8>,
    state: ResponseState,
}

/// Proof that a response was produced.
///
/// Only the `send_*` methods create it, so a handler cannot return without
/// answering the request.
#[derive(Debug)]
#[must_use = "return it from the handler"]
pub struct Handled(pub(crate) ());

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResponseState {
    Building,
    Sent,
}

impl Response {
    #[cfg(test)]
    pub(crate) fn new(limits: &RespLimits) -> Self {
        Self::with_buffer(limits, Vec::with_capacity(limits.default_capacity))
    }

    // Reuses an allocation recycled from the previous request.
    #[inline]
    pub(crate) fn with_buffer(limits: &RespLimits, mut buffer: Vec<u8>) -> Self {
        if buffer.capacity() > limits.max_capacity {
            buffer = Vec::with_capacity(limits.default_capacity);
        }
        buffer.clear();

        Self {
            status: StatusCode::Ok,
            headers: Vec::new(),
            header_limit: limits.header_count,
            keep_alive: true,
            head_only: false,

            buffer,
            state: ResponseState::Building,
        }
    }

    #[inline(always)]
    pub(crate) fn head_only(&mut self, head_only: bool) {
        self.head_only = head_only;
    }

    #[inline(always)]
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    #[inline(always)]
    pub(crate) fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

// Public API
impl Response {
    #[inline]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        if self.check_building("status") {
            self.status = status;
        }
        self
    }

    /// Sets a header, replacing an existing one with the same name.
    ///
    /// `Set-Cookie` is never replaced: each call adds another line. Headers
    /// with an empty name, a name containing `:`, or CR/LF anywhere are
    /// dropped, as are headers beyond [`RespLimits::header_count`].
    pub fn set_header<V: ToString>(&mut self, name: &str, value: V) -> &mut Self {
        if !self.check_building("set_header") {
            return self;
        }

        let value = value.to_string();
        if name.is_empty()
            || name.contains(|c| matches!(c, ':' | '\r' | '\n'))
            || value.contains(|c| matches!(c, '\r' | '\n'))
        {
            tracing::warn!(header = name, "invalid response header dropped");
            return self;
        }

        if !name.eq_ignore_ascii_case("set-cookie") {
            if let Some(header) = self.headers.iter_mut().find(|h| h.is(name)) {
                header.value = value;
                return self;
            }
        }

        if self.headers.len() >= self.header_limit {
            tracing::warn!(header = name, limit = self.header_limit, "response header limit reached");
            return self;
        }

        self.headers.push(Header::new(name, value));
        self
    }

    /// Asks for the connection to be closed after this response.
    #[inline]
    pub fn close(&mut self) -> &mut Self {
        if self.check_building("close") {
            self.keep_alive = false;
        }
        self
    }

    #[inline(always)]
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    #[inline(always)]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    #[inline(always)]
    pub const fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline(always)]
    pub fn is_sent(&self) -> bool {
        self.state == ResponseState::Sent
    }
}

impl Response {
    /// Serializes status, headers and body.
    ///
    /// `content_type` is only written when the handler did not set one.
    pub(crate) fn finish(&mut self, content_type: Option<&str>, body: &[u8]) -> Handled {
        if !self.check_building("send") {
            return Handled(());
        }

        let content_type = content_type.filter(|_| self.header("content-type").is_none());
        let buffer = &mut self.buffer;
        buffer.clear();

        buffer.extend_from_slice(self.status.status_line());
        if let Some(content_type) = content_type {
            buffer.extend_from_slice(b"Content-Type: ");
            buffer.extend_from_slice(content_type.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }

        buffer.extend_from_slice(b"Content-Length: ");
        types::push_usize(buffer, body.len());
        buffer.extend_from_slice(b"\r\n");

        for header in &self.headers {
            buffer.extend_from_slice(header.name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(header.value.as_bytes());
            buffer.extend_from_slice(b"\r\n");
        }

        buffer.extend_from_slice(match self.keep_alive {
            true => b"Connection: keep-alive\r\n\r\n",
            false => b"Connection: close\r\n\r\n",
        });

        if !self.head_only {
            buffer.extend_from_slice(body);
        }

        self.state = ResponseState::Sent;
        Handled(())
    }

    #[inline]
    fn check_building(&self, action: &'static str) -> bool {
        if self.state == ResponseState::Sent {
            tracing::debug!(action, "response already sent, ignoring");
            return false;
        }
        true
    }
}
