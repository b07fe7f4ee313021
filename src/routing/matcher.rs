//! Route template matching.
//!
//! A template is a `/`-separated path whose segments are either literal or
//! a `:name` parameter. Matching is a pure function of the template and the
//! request target: it never touches a request, and a failed match produces
//! nothing for the caller to apply.
//!
//! # Rules
//! - The query string (`?` onward) of the request target is ignored.
//! - One trailing `/` is ignored on both sides; `/` alone is kept.
//! - Literal segments compare byte-for-byte; there is no case folding
//!   and no percent-decoding.
//! - Both sides must have the same number of segments.
//! - Empty segments (`//`) are compared literally; a parameter aligned with
//!   an empty segment binds the empty string.

/// Longest parameter name kept, in bytes.
pub const MAX_PARAM_NAME: usize = 63;
/// Longest parameter value kept, in bytes.
pub const MAX_PARAM_VALUE: usize = 255;

/// Values bound by `:name` segments, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, name: &str, value: &str) {
        self.0.push((
            truncate(name, MAX_PARAM_NAME).to_owned(),
            truncate(value, MAX_PARAM_VALUE).to_owned(),
        ));
    }
}

/// Matches `path` (a request target, query allowed) against `template`.
///
/// ```
/// use ristretto::match_path;
///
/// let params = match_path("/users/:id", "/users/42?full=1").unwrap();
/// assert_eq!(params.get("id"), Some("42"));
///
/// assert!(match_path("/users/:id", "/users").is_none());
/// assert!(match_path("/about", "/about/").is_some());
/// ```
pub fn match_path(template: &str, path: &str) -> Option<PathParams> {
    let path = match path.find('?') {
        Some(pos) => &path[..pos],
        None => path,
    };

    let template = trim_trailing_slash(template);
    let path = trim_trailing_slash(path);

    if template == path {
        return Some(PathParams::new());
    }

    let mut params = PathParams::new();
    let mut template_segments = template.split('/');
    let mut path_segments = path.split('/');

    loop {
        match (template_segments.next(), path_segments.next()) {
            (None, None) => return Some(params),
            (Some(expected), Some(actual)) => match expected.strip_prefix(':') {
                Some(name) => params.push(name, actual),
                None if expected == actual => {}
                None => return None,
            },
            _ => return None,
        }
    }
}

#[inline]
fn trim_trailing_slash(path: &str) -> &str {
    match path.len() > 1 {
        true => path.strip_suffix('/').unwrap_or(path),
        false => path,
    }
}

// Cuts at the last char boundary not past `max`.
#[inline]
fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }

    &value[..end]
}
