//! Well-known header name constants, carried over from the teacher's
//! `header.rs` and extended with the names this parser's derived fields
//! need to look up.

pub const CONNECTION: &[u8] = b"Connection";
pub const KEEP_ALIVE: &[u8] = b"Keep-Alive";
pub const TRANSFER_ENCODING: &[u8] = b"Transfer-Encoding";
pub const CONTENT_LENGTH: &[u8] = b"Content-Length";
pub const CONTENT_ENCODING: &[u8] = b"Content-Encoding";
pub const CONTENT_TYPE: &[u8] = b"Content-Type";
pub const UPGRADE: &[u8] = b"Upgrade";
pub const HOST: &[u8] = b"Host";
pub const TRAILER: &[u8] = b"Trailer";
pub const SEC_WEBSOCKET_KEY1: &[u8] = b"Sec-WebSocket-Key1";
