//! Incremental, streaming HTTP/1.x message parser.
//!
//! Given an arbitrarily chunked byte stream, this crate produces a sequence
//! of parsed message heads paired with lazy body streams ([`BodySink`]),
//! and surfaces leftover bytes belonging to the next message or to an
//! upgraded protocol. Transport I/O, TLS, connection pooling, the
//! high-level request/response object model, and request serialization are
//! all out of scope -- see [`MessageParser`] for the interface this crate
//! exposes to them.

pub mod ascii;
pub mod chunked;
pub mod encoding;
pub mod error;
pub mod head;
pub mod header;
pub mod headers;
pub mod method;
pub mod parser;
pub mod payload;
pub mod sink;
pub mod status;
pub mod uri;
pub mod version;

pub use error::{Error, Result};
pub use head::{HeadersParser, RequestHead, ResponseHead};
pub use header as header_names;
pub use headers::{Coding, HeaderField, Headers};
pub use method::{KnownMethod, Method};
pub use parser::{FeedOutput, Head, MessageParser, ParserOptions};
pub use sink::{BodySink, BodySinkWriter};
pub use status::StatusCode;
pub use uri::RequestTarget;
pub use version::HttpVersion;
