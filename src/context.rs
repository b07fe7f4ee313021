//! Per-request handler context.

use crate::{
    errors::ErrorKind,
    http::{
        request::{Body, Request},
        response::{Handled, Response},
        types::{Method, StatusCode},
    },
    limits::RespLimits,
    query::{self, Query, QueryMap},
};
use serde::Serialize;
use std::{any::Any, collections::HashMap, str::FromStr};

/// Everything a middleware or handler sees for one request: the request,
/// the response being built, decoded query parameters, and typed values
/// shared along the pipeline.
///
/// A context lives for exactly one request/response cycle.
pub struct Context {
    request: Request,
    response: Response,
    query: QueryMap,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Builds the context, decoding the query string.
    pub(crate) fn new(
        request: Request,
        limits: &RespLimits,
        buffer: Vec<u8>,
        query_parts: usize,
    ) -> Result<Self, ErrorKind> {
        let query = match request.query().map(|raw| Query::parse(raw.as_bytes(), query_parts)) {
            Some(Ok(map)) => map,
            Some(Err(query::Error::Empty)) | None => QueryMap::default(),
            Some(Err(err)) => return Err(err.into()),
        };

        let mut response = Response::with_buffer(limits, buffer);
        response.head_only(request.method() == Method::Head);
        if !request.is_keep_alive() {
            response.close();
        }

        Ok(Self {
            request,
            response,
            query,
            data: HashMap::new(),
        })
    }

    #[inline(always)]
    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    #[inline(always)]
    pub(crate) fn into_response(self) -> Response {
        self.response
    }
}

// Request access
impl Context {
    #[inline(always)]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline(always)]
    pub fn method(&self) -> Method {
        self.request.method()
    }

    /// Request path without the query string.
    #[inline(always)]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    #[inline(always)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    #[inline(always)]
    pub fn body(&self) -> &Body {
        self.request.body()
    }

    /// Value bound by a `:name` segment of the matched route.
    #[inline(always)]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// Decoded query value; a key without `=` yields `""`.
    #[inline(always)]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key)
    }

    /// Parses a query value, `None` if it is missing or does not parse.
    ///
    /// ```
    /// # use ristretto::{Context, Handled};
    /// fn page(ctx: &mut Context) -> Handled {
    ///     let page: u32 = ctx.query_parse("page").unwrap_or(1);
    ///     let ratio: f64 = ctx.query_parse("ratio").unwrap_or(0.5);
    ///     ctx.send_text(&format!("{page} {ratio}"))
    /// }
    /// ```
    #[inline]
    pub fn query_parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.query.get(key)?.parse().ok()
    }

    #[inline(always)]
    pub fn query_map(&self) -> &QueryMap {
        &self.query
    }
}

// Shared data
impl Context {
    /// Stores a value for later middleware or the handler, replacing any
    /// previous value under the same key.
    pub fn set_data<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.data.insert(key.to_owned(), Box::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn data<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.data.get(key)?.downcast_ref()
    }

    pub fn data_mut<T: Any + Send + Sync>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key)?.downcast_mut()
    }

    /// Removes and returns the value under `key` if it has type `T`.
    ///
    /// A value of another type is left in place.
    pub fn take_data<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        if !self.data.get(key)?.is::<T>() {
            return None;
        }

        self.data
            .remove(key)?
            .downcast()
            .ok()
            .map(|boxed: Box<T>| *boxed)
    }
}

// Response building
impl Context {
    #[inline(always)]
    pub fn response(&self) -> &Response {
        &self.response
    }

    #[inline]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.response.status(status);
        self
    }

    /// See [`Response::set_header`].
    #[inline]
    pub fn set_header<V: ToString>(&mut self, name: &str, value: V) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    /// Closes the connection after this response.
    #[inline]
    pub fn close(&mut self) -> &mut Self {
        self.response.close();
        self
    }

    #[inline(always)]
    pub fn is_sent(&self) -> bool {
        self.response.is_sent()
    }

    /// Sends a `text/plain` body with the current status.
    #[inline]
    pub fn send_text(&mut self, text: &str) -> Handled {
        self.response.finish(Some("text/plain"), text.as_bytes())
    }

    /// Sends raw bytes with the given content type.
    #[inline]
    pub fn send_bytes(&mut self, content_type: &str, body: &[u8]) -> Handled {
        self.response.finish(Some(content_type), body)
    }

    /// Sends an empty body.
    #[inline]
    pub fn send_empty(&mut self) -> Handled {
        self.response.finish(None, b"")
    }

    /// Serializes `value` as the `application/json` body.
    ///
    /// A value that fails to serialize is answered with a 500 error instead.
    pub fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Handled {
        match serde_json::to_vec(value) {
            Ok(body) => self.response.finish(Some("application/json"), &body),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response body");
                self.send_error(StatusCode::InternalServerError, "Internal Server Error")
            }
        }
    }

    /// Sends `{"error": message}` with the given status.
    pub fn send_error(&mut self, status: StatusCode, message: &str) -> Handled {
        let body = serde_json::json!({ "error": message }).to_string();

        self.response.status(status);
        self.response.finish(Some("application/json"), body.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;
    use serde_json::{json, Value};

    #[test]
    fn query_values() {
        let ctx = context("GET /search?q=hello+world&n=5&ratio=0.25&flag&email=test%40example.com HTTP/1.1\r\n\r\n");

        assert_eq!(ctx.query("q"), Some("hello world"));
        assert_eq!(ctx.query("email"), Some("test@example.com"));
        assert_eq!(ctx.query("flag"), Some(""));
        assert_eq!(ctx.query("missing"), None);

        assert_eq!(ctx.query_parse::<i64>("n"), Some(5));
        assert_eq!(ctx.query_parse::<f64>("ratio"), Some(0.25));
        assert_eq!(ctx.query_parse::<i64>("q"), None);
        assert_eq!(ctx.query_parse::<i64>("missing"), None);
        assert_eq!(ctx.path(), "/search");
    }

    #[test]
    fn query_limit() {
        let request = request("GET /?a&b&c HTTP/1.1\r\n\r\n");
        let result = Context::new(request, &RespLimits::default(), Vec::new(), 2);

        assert!(matches!(
            result,
            Err(ErrorKind::Query(crate::query::Error::OverLimit(2)))
        ));
    }

    #[test]
    fn data_store() {
        let mut ctx = context("GET / HTTP/1.1\r\n\r\n");

        ctx.set_data("user", String::from("ann"));
        ctx.set_data("user", String::from("bob"));
        ctx.set_data("count", 3_u32);

        assert_eq!(ctx.data::<String>("user").map(String::as_str), Some("bob"));
        assert_eq!(ctx.data::<u64>("count"), None);
        *ctx.data_mut::<u32>("count").unwrap() += 1;
        assert_eq!(ctx.data::<u32>("count"), Some(&4));

        assert_eq!(ctx.take_data::<u64>("count"), None);
        assert_eq!(ctx.take_data::<u32>("count"), Some(4));
        assert_eq!(ctx.data::<u32>("count"), None);
    }

    #[test]
    fn send_text_defaults() {
        let mut ctx = context("GET / HTTP/1.1\r\n\r\n");
        let _ = ctx.send_text("Hello, World!");

        let text = str_op(ctx.response().buffer());
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("Connection: keep-alive\r\n\r\nHello, World!"));
    }

    #[test]
    fn send_bytes_content_type() {
        let mut ctx = context("GET /logo HTTP/1.1\r\n\r\n");
        let _ = ctx.send_bytes("image/svg+xml", b"<svg/>");

        let (head, body) = split_response(ctx.response().buffer());
        assert!(head.contains("Content-Type: image/svg+xml\r\n"));
        assert!(head.contains("Content-Length: 6\r\n"));
        assert!(!head.contains("text/plain"));
        assert_eq!(body, "<svg/>");
    }

    #[test]
    fn send_json_body() {
        let mut ctx = context("GET / HTTP/1.1\r\n\r\n");
        let _ = ctx.status(StatusCode::Created).send_json(&json!({"id": 7}));

        let (head, body) = split_response(ctx.response().buffer());
        assert!(head.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(head.contains("Content-Type: application/json\r\n"));
        assert_eq!(serde_json::from_str::<Value>(body).unwrap(), json!({"id": 7}));
    }

    #[test]
    fn send_json_failure_is_500() {
        use std::collections::BTreeMap;

        // JSON object keys must be strings
        let mut bad = BTreeMap::new();
        bad.insert(vec![1_u8], 1);

        let mut ctx = context("GET / HTTP/1.1\r\n\r\n");
        let _ = ctx.send_json(&bad);

        let (head, body) = split_response(ctx.response().buffer());
        assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(
            serde_json::from_str::<Value>(body).unwrap(),
            json!({"error": "Internal Server Error"})
        );
    }

    #[test]
    fn send_error_body() {
        let mut ctx = context("GET / HTTP/1.1\r\n\r\n");
        let _ = ctx.send_error(StatusCode::Unauthorized, "no \"token\"");

        let (head, body) = split_response(ctx.response().buffer());
        assert!(head.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert_eq!(
            serde_json::from_str::<Value>(body).unwrap(),
            json!({"error": "no \"token\""})
        );
    }

    #[test]
    fn http10_closes_by_default() {
        let mut ctx = context("GET / HTTP/1.0\r\n\r\n");
        let _ = ctx.send_text("x");

        assert!(!ctx.response().is_keep_alive());
        assert!(str_op(ctx.response().buffer()).contains("Connection: close\r\n"));
    }

    #[test]
    fn head_has_no_body() {
        let mut ctx = context("HEAD / HTTP/1.1\r\n\r\n");
        let _ = ctx.send_text("body");

        let text = str_op(ctx.response().buffer());
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
