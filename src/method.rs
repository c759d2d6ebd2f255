//! HTTP methods.
//!
//! The teacher's `Method` (`method.rs`) is a closed enum of the nine
//! well-known verbs. The spec requires any RFC 9110 token to be accepted as
//! a method (`method = token`), so this generalizes that enum into a
//! validated wrapper around a token string, keeping the well-known verbs as
//! a fast-path `as_known()` for callers (body-mode selection cares only
//! about HEAD/CONNECT/etc.).

use crate::ascii::is_token;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Validates `bytes` as a `token` and wraps it. Any delimiter
    /// (`"(),/:;<=>?@[\]{}`), whitespace, or non-ASCII byte is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if !is_token(bytes) {
            return Err(Error::bad_method(format!(
                "method contains a non-token byte: {:?}",
                String::from_utf8_lossy(bytes)
            )));
        }
        // Tokens are, by construction, ASCII.
        Ok(Method(unsafe { String::from_utf8_unchecked(bytes.to_vec()) }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_known(&self) -> Option<KnownMethod> {
        Some(match self.0.as_str() {
            "GET" => KnownMethod::Get,
            "HEAD" => KnownMethod::Head,
            "POST" => KnownMethod::Post,
            "PUT" => KnownMethod::Put,
            "DELETE" => KnownMethod::Delete,
            "CONNECT" => KnownMethod::Connect,
            "OPTIONS" => KnownMethod::Options,
            "TRACE" => KnownMethod::Trace,
            "PATCH" => KnownMethod::Patch,
            _ => return None,
        })
    }

    pub fn is_head(&self) -> bool {
        self.as_known() == Some(KnownMethod::Head)
    }

    pub fn is_connect(&self) -> bool {
        self.as_known() == Some(KnownMethod::Connect)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
