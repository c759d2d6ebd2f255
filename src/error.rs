//! Structured errors for the message parser, matching the error kinds an
//! HTTP/1.x implementation needs to distinguish (RFC 9112 framing bugs are
//! security relevant, so callers need to match on *what* went wrong, not
//! just that something did).

use std::fmt;

/// A single malformed line, rendered for diagnostics with a caret marking
/// the byte offset that caused the failure.
///
/// Control bytes are escaped so that a malformed line can never smuggle
/// arbitrary binary noise (or terminal escape codes) into a log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffendingLine {
    pub rendered: String,
    pub caret_offset: usize,
}

impl OffendingLine {
    pub fn new(line: &[u8], offset: usize) -> Self {
        let mut rendered = String::new();
        let mut caret_offset = 0;
        for (i, &b) in line.iter().enumerate() {
            if i == offset {
                caret_offset = rendered.chars().count();
            }
            escape_byte(b, &mut rendered);
        }
        if offset >= line.len() {
            caret_offset = rendered.chars().count();
        }
        Self {
            rendered,
            caret_offset,
        }
    }
}

impl fmt::Display for OffendingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.rendered)?;
        write!(f, "{}^", " ".repeat(self.caret_offset))
    }
}

fn escape_byte(b: u8, out: &mut String) {
    match b {
        b'\\' => out.push_str("\\\\"),
        b'\r' => out.push_str("\\r"),
        b'\n' => out.push_str("\\n"),
        b'\t' => out.push_str("\\t"),
        0x20..=0x7e => out.push(b as char),
        _ => out.push_str(&format!("\\x{:02x}", b)),
    }
}

/// All ways that incoming bytes can fail to be a valid HTTP/1.x message.
///
/// Every variant implies an HTTP status hint of 400 (Bad Request) for a
/// server reading this message; the hint itself is not carried on the
/// error since it is constant and callers already know they are a server.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Generic malformed message: bad header, bad framing, bad CRLF, data
    /// received after a `Connection: close` message.
    #[error("bad HTTP message: {message}")]
    BadHttpMessage { message: String },

    /// Malformed request-line or status-line.
    #[error("bad start line: {message}")]
    BadStatusLine { message: String },

    /// Method token contains a delimiter or non-token byte.
    #[error("bad HTTP method: {message}")]
    BadHttpMethod { message: String },

    /// Header name/value failed structural validation.
    #[error("invalid header: {message}")]
    InvalidHeader { message: String },

    /// The request-target is not a valid URL.
    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    /// A line exceeded the configured maximum.
    #[error("line too long: {observed} bytes (limit {limit})")]
    LineTooLong { observed: usize, limit: usize },

    /// Content-Length body was truncated by `feed_eof`.
    #[error("content-length body ended early")]
    ContentLengthError,

    /// Chunked framing was malformed. `offending` echoes the bytes of the
    /// chunk-size line (or trailer line) that failed to parse.
    #[error("bad chunked transfer-encoding: {message}\n{line}")]
    TransferEncodingError { message: String, line: OffendingLine },

    /// Decompression failed, or a stream was truncated where truncation is
    /// not tolerated (a non-final `deflate` stream with `eof=false`).
    #[error("content-encoding error: {message}")]
    ContentEncodingError { message: String },
}

impl Error {
    pub fn bad_message(message: impl Into<String>) -> Self {
        Error::BadHttpMessage {
            message: message.into(),
        }
    }

    pub fn bad_status_line(message: impl Into<String>) -> Self {
        Error::BadStatusLine {
            message: message.into(),
        }
    }

    pub fn bad_method(message: impl Into<String>) -> Self {
        Error::BadHttpMethod {
            message: message.into(),
        }
    }

    pub fn invalid_header(message: impl Into<String>) -> Self {
        Error::InvalidHeader {
            message: message.into(),
        }
    }

    pub fn line_too_long(observed: usize, limit: usize) -> Self {
        Error::LineTooLong { observed, limit }
    }

    pub fn transfer_encoding(message: impl Into<String>, line: &[u8]) -> Self {
        Error::TransferEncodingError {
            message: message.into(),
            line: OffendingLine::new(line, line.len()),
        }
    }

    /// 400 for every parse error; kept as a method rather than a constant
    /// field so that future status-affecting variants don't need a schema
    /// change.
    pub fn status_hint(&self) -> u16 {
        400
    }
}

pub type Result<T> = std::result::Result<T, Error>;
