use crate::query;
use std::{fmt, io, net::SocketAddr};

/// Failures surfaced by the public server API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listening socket could not be created or bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Per-connection protocol failures.
///
/// Every variant is local to one connection: after it is reported the
/// connection is closed, with or without a response depending on
/// [`ErrorKind::canned`].
#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum ErrorKind {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("request target must start with '/'")]
    InvalidUrl,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    #[error("conflicting Content-Length headers")]
    ConflictingContentLength,
    #[error("Transfer-Encoding is not supported")]
    UnsupportedTransferEncoding,
    #[error("invalid query string: {0}")]
    Query(query::Error),

    #[error("request target too long")]
    UriTooLong,
    #[error("request head too large")]
    HeadersTooLarge,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("request body too large")]
    BodyTooLarge,
    #[error("unsupported HTTP version")]
    UnsupportedVersion,

    #[error("request timed out")]
    Timeout,
    #[error("pending connection queue is full")]
    ServiceUnavailable,

    // 405 needs an `Allow` header computed for the path, so it is built by the connection
    #[error("unknown method token for {0}")]
    UnknownMethod(String),
    #[error("read buffer allocation failed")]
    OutOfMemory,
    #[error("{0}")]
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:literal, $len:literal => $body:literal; )*) => {
        /// Static response bytes for this error, `None` when the connection
        /// must close without writing anything.
        pub(crate) const fn canned(&self) -> Option<&'static [u8]> {
            let response = match self { $(
                Self::$name { .. } => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "Content-Type: text/plain\r\n",
                    "Content-Length: ", $len, "\r\n",
                    "Connection: close\r\n",
                    "\r\n",
                    $body
                ),
            )*
                _ => return None,
            };

            Some(response.as_bytes())
        }

        #[cfg(test)]
        pub(crate) const CANNED_TABLE: &'static [(&'static str, &'static str)] = &[
            $(($len, $body),)*
        ];
    };
}

impl ErrorKind {
    http_errors! {
        InvalidRequestLine: "400 Bad Request", "11" => "Bad Request";
        InvalidUrl: "400 Bad Request", "11" => "Bad Request";
        InvalidHeader: "400 Bad Request", "11" => "Bad Request";
        InvalidEncoding: "400 Bad Request", "11" => "Bad Request";
        InvalidContentLength: "400 Bad Request", "11" => "Bad Request";
        ConflictingContentLength: "400 Bad Request", "11" => "Bad Request";
        UnsupportedTransferEncoding: "400 Bad Request", "11" => "Bad Request";
        Query: "400 Bad Request", "11" => "Bad Request";

        UriTooLong: "414 URI Too Long", "12" => "URI Too Long";
        HeadersTooLarge: "431 Request Header Fields Too Large", "31"
            => "Request Header Fields Too Large";
        TooManyHeaders: "431 Request Header Fields Too Large", "31"
            => "Request Header Fields Too Large";
        BodyTooLarge: "413 Payload Too Large", "17" => "Payload Too Large";
        UnsupportedVersion: "505 HTTP Version Not Supported", "26"
            => "HTTP Version Not Supported";

        Timeout: "408 Request Timeout", "15" => "Request Timeout";
        ServiceUnavailable: "503 Service Unavailable", "19" => "Service Unavailable";
    }
}

impl From<query::Error> for ErrorKind {
    fn from(err: query::Error) -> Self {
        ErrorKind::Query(err)
    }
}
impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::str_op;

    #[test]
    fn canned_lengths_match_bodies() {
        for (len, body) in ErrorKind::CANNED_TABLE {
            assert_eq!(len.parse::<usize>().unwrap(), body.len(), "{body}");
        }
    }

    #[test]
    fn canned_status_lines() {
        #[rustfmt::skip]
        let cases = [
            (ErrorKind::InvalidRequestLine,       Some("HTTP/1.1 400 Bad Request\r\n")),
            (ErrorKind::ConflictingContentLength, Some("HTTP/1.1 400 Bad Request\r\n")),
            (ErrorKind::Query(query::Error::OverLimit(1)), Some("HTTP/1.1 400 Bad Request\r\n")),
            (ErrorKind::UriTooLong,               Some("HTTP/1.1 414 URI Too Long\r\n")),
            (ErrorKind::TooManyHeaders,           Some("HTTP/1.1 431 Request Header Fields Too Large\r\n")),
            (ErrorKind::BodyTooLarge,             Some("HTTP/1.1 413 Payload Too Large\r\n")),
            (ErrorKind::UnsupportedVersion,       Some("HTTP/1.1 505 HTTP Version Not Supported\r\n")),
            (ErrorKind::Timeout,                  Some("HTTP/1.1 408 Request Timeout\r\n")),
            (ErrorKind::ServiceUnavailable,       Some("HTTP/1.1 503 Service Unavailable\r\n")),
            (ErrorKind::UnknownMethod("/".into()), None),
            (ErrorKind::OutOfMemory,              None),
        ];

        for (err, expected) in cases {
            let line = err.canned().map(|bytes| {
                let text = str_op(bytes);
                &text[..text.find("\r\n").unwrap() + 2]
            });
            assert_eq!(line, expected);
        }
    }

    #[test]
    fn canned_always_closes() {
        let bytes = ErrorKind::Timeout.canned().unwrap();
        assert!(str_op(bytes).contains("\r\nConnection: close\r\n\r\n"));
        assert!(str_op(bytes).ends_with("Request Timeout"));
    }

    #[test]
    fn io_has_no_response() {
        let err = ErrorKind::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.canned(), None);
    }
}
