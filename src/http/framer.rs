//! Incremental request framing.
//!
//! Bytes accumulate in a [`ReadBuffer`]; [`Framer::advance`] is called after
//! every read and yields a [`Request`] once the head and the declared body
//! are both buffered. Bytes past the frame stay in the buffer for the next
//! request on the connection.

use crate::{
    errors::ErrorKind,
    http::{
        request::{Body, Request},
        types::{self, Header, Method, Version},
    },
    limits::ReqLimits,
};
use memchr::memmem;

/// Growable per-connection read buffer.
///
/// Capacity starts at `initial` and doubles when full, never past `ceiling`.
#[derive(Debug)]
pub(crate) struct ReadBuffer {
    buffer: Vec<u8>,
    len: usize,
    initial: usize,
    ceiling: usize,
}

impl ReadBuffer {
    #[inline]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        let ceiling = limits.buffer_ceiling().max(1);
        let initial = limits.initial_buffer.clamp(1, ceiling);

        Self {
            buffer: vec![0; initial],
            len: 0,
            initial,
            ceiling,
        }
    }

    #[cfg(test)]
    pub(crate) fn from<V: AsRef<[u8]>>(limits: &ReqLimits, value: V) -> Self {
        let mut buffer = Self::new(limits);
        let mut rest = value.as_ref();
        while !rest.is_empty() {
            let spare = buffer.spare().unwrap();
            let n = spare.len().min(rest.len());
            spare[..n].copy_from_slice(&rest[..n]);
            buffer.advance(n);
            rest = &rest[n..];
        }
        buffer
    }

    #[inline(always)]
    pub(crate) fn filled(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Free space to read into, growing the buffer if it is full.
    pub(crate) fn spare(&mut self) -> Result<&mut [u8], ErrorKind> {
        if self.len == self.buffer.len() {
            if self.buffer.len() >= self.ceiling {
                return Err(ErrorKind::BodyTooLarge);
            }

            let new_len = self.buffer.len().saturating_mul(2).min(self.ceiling);
            self.buffer
                .try_reserve_exact(new_len - self.buffer.len())
                .map_err(|_| ErrorKind::OutOfMemory)?;
            self.buffer.resize(new_len, 0);

            tracing::trace!(capacity = new_len, "read buffer grown");
        }

        Ok(&mut self.buffer[self.len..])
    }

    #[inline(always)]
    pub(crate) fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buffer.len());
    }

    /// Drops the first `n` bytes, keeping the rest at the front.
    #[inline]
    pub(crate) fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.buffer.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Returns to the initial capacity, discarding any buffered bytes.
    #[inline]
    pub(crate) fn release(&mut self) {
        self.len = 0;
        if self.buffer.len() > self.initial {
            self.buffer = vec![0; self.initial];
        }
    }
}

// What is known once the head has been parsed.
#[derive(Debug)]
struct Head {
    request: Request,
    len: usize,
    content_length: usize,
    json: bool,
}

/// Request framing state for one connection.
#[derive(Debug)]
pub(crate) struct Framer {
    limits: ReqLimits,
    head: Option<Head>,
}

impl Framer {
    #[inline]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Self {
            limits: limits.clone(),
            head: None,
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.head = None;
    }

    /// Tries to complete a frame from the buffered bytes.
    ///
    /// `Ok(None)` means more bytes are needed. On `Ok(Some(_))` the frame is
    /// removed from the buffer.
    pub(crate) fn advance(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Request>, ErrorKind> {
        if self.head.is_none() {
            let data = buffer.filled();

            let Some(pos) = memmem::find(data, b"\r\n\r\n") else {
                if data.len() > self.limits.header_size {
                    return Err(ErrorKind::HeadersTooLarge);
                }
                return Ok(None);
            };

            let len = pos + 4;
            if len > self.limits.header_size {
                return Err(ErrorKind::HeadersTooLarge);
            }

            self.head = Some(parse_head(&data[..pos], len, &self.limits)?);
        }

        let total = match &self.head {
            Some(head) => head.len + head.content_length,
            None => return Ok(None),
        };

        if buffer.len() < total {
            return Ok(None);
        }

        let Some(Head {
            mut request,
            len,
            json,
            ..
        }) = self.head.take()
        else {
            return Ok(None);
        };

        request.body = Body::classify(&buffer.filled()[len..total], json);
        buffer.consume(total);

        Ok(Some(request))
    }
}

fn parse_head(head: &[u8], len: usize, limits: &ReqLimits) -> Result<Head, ErrorKind> {
    let text = simdutf8::basic::from_utf8(head).map_err(|_| ErrorKind::InvalidEncoding)?;
    let mut lines = text.split("\r\n");

    let mut request = parse_request_line(lines.next().unwrap_or_default(), limits)?;
    let mut content_length = None;
    let mut json = false;

    for line in lines {
        if request.headers.len() >= limits.header_count {
            return Err(ErrorKind::TooManyHeaders);
        }

        let (name, value) = line.split_once(':').ok_or(ErrorKind::InvalidHeader)?;
        if name.is_empty() || name.contains(is_blank) {
            return Err(ErrorKind::InvalidHeader);
        }
        let value = value.trim_matches(is_blank);
        let header = Header::new(name, value);

        if header.is("content-length") {
            let parsed =
                types::slice_to_usize(value.as_bytes()).ok_or(ErrorKind::InvalidContentLength)?;

            match content_length {
                Some(previous) if previous != parsed => {
                    return Err(ErrorKind::ConflictingContentLength)
                }
                _ => {}
            }
            if parsed > limits.body_size {
                return Err(ErrorKind::BodyTooLarge);
            }

            content_length = Some(parsed);
        } else if header.is("transfer-encoding") {
            return Err(ErrorKind::UnsupportedTransferEncoding);
        } else if header.is("connection") {
            if let Some(keep_alive) = connection_intent(value) {
                request.keep_alive = keep_alive;
            }
        } else if header.is("content-type") {
            json = is_json_media_type(value);
        }

        request.headers.push(header);
    }

    request.content_length = content_length;

    Ok(Head {
        request,
        len,
        content_length: content_length.unwrap_or(0),
        json,
    })
}

fn parse_request_line(line: &str, limits: &ReqLimits) -> Result<Request, ErrorKind> {
    let mut parts = line.split(' ');

    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ErrorKind::InvalidRequestLine);
    };
    if method.is_empty() || target.is_empty() || version.is_empty() {
        return Err(ErrorKind::InvalidRequestLine);
    }

    let version = Version::from_bytes(version.as_bytes())?;

    if !target.starts_with('/') {
        return Err(ErrorKind::InvalidUrl);
    }
    if target.len() > limits.url_size {
        return Err(ErrorKind::UriTooLong);
    }

    let method = Method::from_token(method)
        .ok_or_else(|| ErrorKind::UnknownMethod(target.to_owned()))?;

    Ok(Request::new(method, target.to_owned(), version))
}

#[inline(always)]
fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

// `close` wins over `keep-alive` when a client sends both.
fn connection_intent(value: &str) -> Option<bool> {
    let mut intent = None;

    for token in value.split(',').map(str::trim) {
        if token.eq_ignore_ascii_case("close") {
            return Some(false);
        }
        if token.eq_ignore_ascii_case("keep-alive") {
            intent = Some(true);
        }
    }

    intent
}

fn is_json_media_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or_default().trim();

    essence.eq_ignore_ascii_case("application/json")
        || (essence.len() > 5
            && essence.is_char_boundary(essence.len() - 5)
            && essence[essence.len() - 5..].eq_ignore_ascii_case("+json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(raw: &str) -> Result<Option<Request>, ErrorKind> {
        frame_with(&ReqLimits::default(), raw)
    }

    fn frame_with(limits: &ReqLimits, raw: &str) -> Result<Option<Request>, ErrorKind> {
        let mut buffer = ReadBuffer::from(limits, raw);
        Framer::new(limits).advance(&mut buffer)
    }

    #[test]
    fn simple_get() {
        let req = frame("GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap()
            .unwrap();

        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.target(), "/hello");
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(req.header("host"), Some("x"));
        assert!(req.is_keep_alive());
        assert!(req.body().is_none());
    }

    #[test]
    fn incomplete() {
        let cases = [
            "",
            "GET / HTTP/1.1",
            "GET / HTTP/1.1\r\nHost: x\r\n",
            "POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc",
        ];

        for raw in cases {
            assert_eq!(frame(raw), Ok(None), "{raw:?}");
        }
    }

    #[test]
    fn request_line_errors() {
        #[rustfmt::skip]
        let cases = [
            ("GET /\r\n\r\n",                     ErrorKind::InvalidRequestLine),
            ("GET  / HTTP/1.1\r\n\r\n",           ErrorKind::InvalidRequestLine),
            ("GET / HTTP/1.1 x\r\n\r\n",          ErrorKind::InvalidRequestLine),
            ("\r\n\r\n",                          ErrorKind::InvalidRequestLine),
            ("GET / HTTP/2.0\r\n\r\n",            ErrorKind::UnsupportedVersion),
            ("GET / http/1.1\r\n\r\n",            ErrorKind::UnsupportedVersion),
            ("GET hello HTTP/1.1\r\n\r\n",        ErrorKind::InvalidUrl),
            ("BREW / HTTP/1.1\r\n\r\n",           ErrorKind::UnknownMethod("/".into())),
            ("get /x HTTP/1.1\r\n\r\n",           ErrorKind::UnknownMethod("/x".into())),
        ];

        for (raw, expected) in cases {
            assert_eq!(frame(raw), Err(expected), "{raw:?}");
        }
    }

    #[test]
    fn target_length() {
        let ok = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(254));
        let long = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(255));

        assert!(frame(&ok).unwrap().is_some());
        assert_eq!(frame(&long), Err(ErrorKind::UriTooLong));
    }

    #[test]
    fn header_errors() {
        #[rustfmt::skip]
        let cases = [
            ("GET / HTTP/1.1\r\nNoColon\r\n\r\n",               ErrorKind::InvalidHeader),
            ("GET / HTTP/1.1\r\n: value\r\n\r\n",               ErrorKind::InvalidHeader),
            ("GET / HTTP/1.1\r\nBad Name: v\r\n\r\n",           ErrorKind::InvalidHeader),
            ("GET / HTTP/1.1\r\nContent-Length: abc\r\n\r\n",   ErrorKind::InvalidContentLength),
            ("GET / HTTP/1.1\r\nContent-Length: -1\r\n\r\n",    ErrorKind::InvalidContentLength),
            ("GET / HTTP/1.1\r\nContent-Length:\r\n\r\n",       ErrorKind::InvalidContentLength),
            ("GET / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\n",
                ErrorKind::ConflictingContentLength),
            ("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
                ErrorKind::UnsupportedTransferEncoding),
        ];

        for (raw, expected) in cases {
            assert_eq!(frame(raw), Err(expected), "{raw:?}");
        }
    }

    #[test]
    fn identical_content_lengths() {
        let req = frame("POST / HTTP/1.1\r\nContent-Length: 2\r\ncontent-length: 2\r\n\r\nhi")
            .unwrap()
            .unwrap();

        assert_eq!(req.content_length(), Some(2));
        assert_eq!(req.body().as_text(), Some("hi"));
    }

    #[test]
    fn body_too_large_is_detected_from_header() {
        let limits = ReqLimits {
            body_size: 16,
            ..ReqLimits::default()
        };

        assert_eq!(
            frame_with(&limits, "POST / HTTP/1.1\r\nContent-Length: 17\r\n\r\n"),
            Err(ErrorKind::BodyTooLarge)
        );
        assert_eq!(
            frame_with(&limits, "POST / HTTP/1.1\r\nContent-Length: 16\r\n\r\n"),
            Ok(None)
        );
    }

    #[test]
    fn too_many_headers() {
        let limits = ReqLimits {
            header_count: 2,
            ..ReqLimits::default()
        };

        assert!(frame_with(&limits, "GET / HTTP/1.1\r\na: 1\r\nb: 2\r\n\r\n")
            .unwrap()
            .is_some());
        assert_eq!(
            frame_with(&limits, "GET / HTTP/1.1\r\na: 1\r\nb: 2\r\nc: 3\r\n\r\n"),
            Err(ErrorKind::TooManyHeaders)
        );
    }

    #[test]
    fn head_too_large() {
        let limits = ReqLimits {
            header_size: 64,
            ..ReqLimits::default()
        };
        let long = format!("GET / HTTP/1.1\r\nX-Pad: {}\r\n\r\n", "p".repeat(50));
        let unterminated = format!("GET / HTTP/1.1\r\nX-Pad: {}", "p".repeat(60));

        assert_eq!(frame_with(&limits, &long), Err(ErrorKind::HeadersTooLarge));
        assert_eq!(
            frame_with(&limits, &unterminated),
            Err(ErrorKind::HeadersTooLarge)
        );
    }

    #[test]
    fn invalid_utf8_head() {
        let limits = ReqLimits::default();
        let mut buffer = ReadBuffer::from(&limits, b"GET /\xff HTTP/1.1\r\n\r\n");

        assert_eq!(
            Framer::new(&limits).advance(&mut buffer),
            Err(ErrorKind::InvalidEncoding)
        );
    }

    #[test]
    fn keep_alive_intent() {
        #[rustfmt::skip]
        let cases = [
            ("HTTP/1.1", None,                        true),
            ("HTTP/1.0", None,                        false),
            ("HTTP/1.1", Some("close"),               false),
            ("HTTP/1.1", Some("Close"),               false),
            ("HTTP/1.0", Some("keep-alive"),          true),
            ("HTTP/1.0", Some("Keep-Alive"),          true),
            ("HTTP/1.1", Some("keep-alive, close"),   false),
            ("HTTP/1.0", Some("upgrade"),             false),
            ("HTTP/1.1", Some("upgrade"),             true),
        ];

        for (version, connection, expected) in cases {
            let raw = match connection {
                Some(value) => format!("GET / {version}\r\nConnection: {value}\r\n\r\n"),
                None => format!("GET / {version}\r\n\r\n"),
            };

            let req = frame(&raw).unwrap().unwrap();
            assert_eq!(req.is_keep_alive(), expected, "{raw:?}");
        }
    }

    #[test]
    fn json_bodies() {
        #[rustfmt::skip]
        let cases = [
            ("application/json",                 r#"{"a":1}"#, Body::Json(json!({"a": 1}))),
            ("Application/JSON; charset=utf-8",  r#"{"a":1}"#, Body::Json(json!({"a": 1}))),
            ("application/problem+json",         "[true]",     Body::Json(json!([true]))),
            ("application/json",                 "{oops",      Body::Text("{oops".into())),
            ("text/plain",                       r#"{"a":1}"#, Body::Text(r#"{"a":1}"#.into())),
            ("application/jsonx",                "1",          Body::Text("1".into())),
        ];

        for (content_type, body, expected) in cases {
            let raw = format!(
                "POST / HTTP/1.1\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );

            let req = frame(&raw).unwrap().unwrap();
            assert_eq!(req.body(), &expected, "{content_type}");
        }
    }

    #[test]
    fn pipelined_requests_stay_in_order() {
        let limits = ReqLimits::default();
        let mut buffer = ReadBuffer::from(
            &limits,
            "POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\n\r\nGET /c",
        );
        let mut framer = Framer::new(&limits);

        let first = framer.advance(&mut buffer).unwrap().unwrap();
        assert_eq!(first.target(), "/a");
        assert_eq!(first.body().as_text(), Some("abc"));

        let second = framer.advance(&mut buffer).unwrap().unwrap();
        assert_eq!(second.target(), "/b");

        assert_eq!(framer.advance(&mut buffer), Ok(None));
        assert_eq!(buffer.filled(), b"GET /c");
    }

    #[test]
    fn body_arrives_in_pieces() {
        let limits = ReqLimits::default();
        let mut buffer = ReadBuffer::from(&limits, "POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab");
        let mut framer = Framer::new(&limits);

        assert_eq!(framer.advance(&mut buffer), Ok(None));

        let spare = buffer.spare().unwrap();
        spare[..2].copy_from_slice(b"cd");
        buffer.advance(2);

        let req = framer.advance(&mut buffer).unwrap().unwrap();
        assert_eq!(req.body().as_text(), Some("abcd"));
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn buffer_doubles_up_to_ceiling() {
        let limits = ReqLimits {
            initial_buffer: 8,
            header_size: 16,
            body_size: 16,
            ..ReqLimits::default()
        };
        let mut buffer = ReadBuffer::new(&limits);
        let mut capacities = vec![buffer.capacity()];

        loop {
            match buffer.spare() {
                Ok(spare) => {
                    let n = spare.len();
                    buffer.advance(n);
                    capacities.push(buffer.capacity());
                }
                Err(err) => {
                    assert_eq!(err, ErrorKind::BodyTooLarge);
                    break;
                }
            }
        }

        assert_eq!(capacities, [8, 8, 16, 32]);

        buffer.release();
        assert_eq!((buffer.len(), buffer.capacity()), (0, 8));
    }
}
