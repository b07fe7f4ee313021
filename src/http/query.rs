//! Query string splitting and decoding.

use memchr::memchr;
use std::borrow::Cow;

/// Splits a raw query on `&`, each pair on its first `=`.
///
/// A key without `=` maps to an empty value and a trailing `&` adds nothing.
/// Splitting borrows from the input; turning `+` and `%XX` into text is up to
/// the collector ([`QueryMap`] runs every side through [`decode`]).
///
/// # Examples
/// ```rust
/// use ristretto::query::{Query, QueryMap};
///
/// // Raw, still encoded pairs in arrival order
/// let raw: Vec<(&[u8], &[u8])> = Query::parse(b"name=ann&city", 10).unwrap();
/// assert_eq!(raw, [(&b"name"[..], &b"ann"[..]), (&b"city"[..], &b""[..])]);
///
/// // Decoded
/// let map: QueryMap = Query::parse(b"q=hello+world&to=me%40host", 10).unwrap();
/// assert_eq!(map.get("q"), Some("hello world"));
/// assert_eq!(map.get("to"), Some("me@host"));
///
/// // Too many pairs for the limit
/// assert!(Query::parse::<QueryMap>(b"a=1&b=2", 1).is_err());
/// ```
pub struct Query;

impl Query {
    /// Collects `query` into a fresh `C`. A leading `?` is ignored.
    #[inline]
    pub fn parse<'a, C: QueryCollector<'a>>(query: &'a [u8], limit: usize) -> Result<C, Error> {
        let mut collected = C::with_capacity(limit.min(16));
        Self::parse_into(&mut collected, query, limit)?;
        Ok(collected)
    }

    /// Appends the pairs of `query` to `collected`.
    ///
    /// The limit applies to the total, pairs already held included.
    ///
    /// ```
    /// use ristretto::query::{Error, Query, QueryMap};
    ///
    /// let mut map = QueryMap::default();
    /// Query::parse_into(&mut map, b"a=1", 2).unwrap();
    /// Query::parse_into(&mut map, b"?b=2", 2).unwrap();
    /// assert_eq!(map.len(), 2);
    ///
    /// assert_eq!(Query::parse_into(&mut map, b"c=3", 2), Err(Error::OverLimit(2)));
    /// ```
    pub fn parse_into<'a, C: QueryCollector<'a>>(
        collected: &mut C,
        query: &'a [u8],
        limit: usize,
    ) -> Result<(), Error> {
        let mut rest = query.strip_prefix(b"?").unwrap_or(query);
        if rest.is_empty() {
            return Err(Error::Empty);
        }

        while !rest.is_empty() {
            if collected.count() >= limit {
                return Err(Error::OverLimit(limit));
            }

            let (pair, tail) = split_at_byte(rest, b'&');
            let (key, value) = split_at_byte(pair, b'=');

            collected.push_pair(key, value);
            rest = tail;
        }

        Ok(())
    }
}

#[inline(always)]
fn split_at_byte(src: &[u8], byte: u8) -> (&[u8], &[u8]) {
    match memchr(byte, src) {
        Some(pos) => (&src[..pos], &src[pos + 1..]),
        None => (src, &src[src.len()..]),
    }
}

/// Decodes `+` as a space and `%XX` as the byte `XX`.
///
/// A `%` not followed by two hex digits is kept literally. The result is
/// interpreted as UTF-8, replacing invalid sequences.
///
/// ```
/// use ristretto::query::decode;
///
/// assert_eq!(decode(b"a+b%21"), "a b!");
/// assert_eq!(decode(b"100%"), "100%");
/// assert_eq!(decode(b"%zz"), "%zz");
/// ```
pub fn decode(src: &[u8]) -> Cow<'_, str> {
    if !src.iter().any(|&b| b == b'+' || b == b'%') {
        return String::from_utf8_lossy(src);
    }

    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        match src[i] {
            b'+' => out.push(b' '),
            b'%' => match (src.get(i + 1).and_then(hex), src.get(i + 2).and_then(hex)) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            byte => out.push(byte),
        }
        i += 1;
    }

    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

#[inline(always)]
fn hex(byte: &u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Destination for split query pairs.
///
/// `'a` is the lifetime of the raw query bytes, so collectors may keep
/// borrowed slices.
pub trait QueryCollector<'a>: Sized {
    fn with_capacity(capacity: usize) -> Self;

    /// Receives one pair, both sides still encoded.
    fn push_pair(&mut self, key: &'a [u8], value: &'a [u8]);

    /// Pairs held so far, checked against the limit before each push.
    fn count(&self) -> usize;
}

impl<'a> QueryCollector<'a> for Vec<(&'a [u8], &'a [u8])> {
    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }

    #[inline(always)]
    fn push_pair(&mut self, key: &'a [u8], value: &'a [u8]) {
        self.push((key, value));
    }

    #[inline(always)]
    fn count(&self) -> usize {
        self.len()
    }
}

/// Decoded query parameters in arrival order.
///
/// Duplicate keys are all kept; [`get`](QueryMap::get) returns the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMap(Vec<(String, String)>);

impl QueryMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value given for `key`.
    pub fn get_all<'m>(&'m self, key: &'m str) -> impl Iterator<Item = &'m str> + 'm {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> QueryCollector<'a> for QueryMap {
    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        QueryMap(Vec::with_capacity(capacity))
    }

    #[inline]
    fn push_pair(&mut self, key: &'a [u8], value: &'a [u8]) {
        self.0
            .push((decode(key).into_owned(), decode(value).into_owned()));
    }

    #[inline(always)]
    fn count(&self) -> usize {
        self.0.len()
    }
}

/// Why a query string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// More pairs than the limit carried here.
    #[error("query parameter limit exceeded: limit={0}")]
    OverLimit(usize),

    /// Nothing after the optional `?`.
    #[error("query string is empty")]
    Empty,
}
