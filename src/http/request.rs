use crate::{
    http::types::{Header, Method, Version},
    routing::matcher::PathParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
};

/// Request body, classified by `Content-Type` once the frame is complete.
///
/// A body declared as JSON that fails to parse is kept as [`Body::Text`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body bytes were sent (or the request is `HEAD`).
    #[default]
    None,
    /// Body bytes as text, invalid UTF-8 replaced.
    Text(String),
    /// Parsed `application/json` (or `+json`) body.
    Json(Value),
}

impl Body {
    pub(crate) fn classify(bytes: &[u8], json: bool) -> Self {
        if bytes.is_empty() {
            return Body::None;
        }

        if json {
            if let Ok(value) = serde_json::from_slice(bytes) {
                return Body::Json(value);
            }
        }

        Body::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Deserializes a JSON body into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(self.as_json()?).ok()
    }
}

/// One framed HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) version: Version,

    pub(crate) headers: Vec<Header>,
    pub(crate) content_length: Option<usize>,
    pub(crate) keep_alive: bool,

    pub(crate) body: Body,
    pub(crate) params: PathParams,

    pub(crate) client_addr: SocketAddr,
}

impl Request {
    const UNKNOWN_CLIENT: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

    #[inline(always)]
    pub(crate) fn new(method: Method, target: String, version: Version) -> Self {
        Request {
            method,
            target,
            version,

            headers: Vec::new(),
            content_length: None,
            keep_alive: version.keep_alive_default(),

            body: Body::None,
            params: PathParams::new(),

            client_addr: Self::UNKNOWN_CLIENT,
        }
    }

    #[inline]
    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    #[inline]
    pub(crate) fn clear_body(&mut self) {
        self.body = Body::None;
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn client_addr(&self) -> &SocketAddr {
        &self.client_addr
    }

    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The raw request target: path plus query, as received.
    #[inline(always)]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The target without its query string.
    #[inline]
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(pos) => &self.target[..pos],
            None => &self.target,
        }
    }

    /// The raw query string without the leading `?`.
    #[inline]
    pub fn query(&self) -> Option<&str> {
        self.target.find('?').map(|pos| &self.target[pos + 1..])
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// First header with this name, compared case-insensitively.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Parses a header value, `None` if it is missing or does not parse.
    #[inline]
    pub fn header_parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.header(name)?.parse().ok()
    }

    #[inline(always)]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    /// Whether the client asked for the connection to stay open.
    #[inline(always)]
    pub const fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline(always)]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Value bound by a `:name` segment of the matched route.
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    #[inline(always)]
    pub const fn params(&self) -> &PathParams {
        &self.params
    }
}
