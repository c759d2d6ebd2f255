//! Case-insensitive, order-preserving, duplicate-preserving header map.
//!
//! Generalizes the teacher's `HttpHeaders` (`spec.rs`), which is a flat
//! `Vec<HttpHeader>` walked linearly by `find()`. Messages with many
//! headers make that O(n) lookup costly, so this keeps the same ordered
//! `Vec` as the source of truth (for `raw_headers` and iteration order) but
//! adds a case-folded name index for `find`/`has`.

use std::collections::HashMap;

use bytes::Bytes;

use crate::ascii::trim_ows;
use crate::error::Error;
use crate::header::*;

/// One header field exactly as received: original name casing, trimmed
/// value bytes (OWS around the value is not semantically part of it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

fn lower_key(name: &[u8]) -> Vec<u8> {
    name.to_ascii_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct Headers {
    raw: Vec<HeaderField>,
    index: HashMap<Vec<u8>, Vec<usize>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Bytes, value: Bytes) {
        let key = lower_key(&name);
        let i = self.raw.len();
        self.raw.push(HeaderField { name, value });
        self.index.entry(key).or_insert_with(Vec::new).push(i);
    }

    pub fn raw_headers(&self) -> &[HeaderField] {
        &self.raw
    }

    /// All values for `name`, in receive order, case-insensitive lookup.
    pub fn find<'a>(&'a self, name: &[u8]) -> impl Iterator<Item = &'a HeaderField> + 'a {
        let idxs = self.index.get(&lower_key(name)).cloned().unwrap_or_default();
        idxs.into_iter().map(move |i| &self.raw[i])
    }

    pub fn has(&self, name: &[u8]) -> bool {
        self.index.contains_key(&lower_key(name))
    }

    pub fn get_single(&self, name: &[u8]) -> Option<&HeaderField> {
        self.find(name).next()
    }
}

/// One supported content/transfer coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Deflate,
    Gzip,
    Brotli,
    Zstd,
}

impl Coding {
    fn from_token(token: &[u8]) -> Option<Coding> {
        let lower = token.to_ascii_lowercase();
        match lower.as_slice() {
            b"deflate" => Some(Coding::Deflate),
            b"gzip" | b"x-gzip" => Some(Coding::Gzip),
            b"br" => Some(Coding::Brotli),
            b"zstd" => Some(Coding::Zstd),
            _ => None,
        }
    }
}

/// Splits a header value on `,`, trims OWS around each token, and drops
/// empty tokens (RFC 9110's `#element` list rule tolerates them).
pub fn comma_tokens(value: &[u8]) -> Vec<Vec<u8>> {
    value
        .split(|&b| b == b',')
        .map(trim_ows)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_vec())
        .collect()
}

/// `Content-Length = 1*DIGIT`. All occurrences must agree if duplicated.
pub fn parse_content_length(headers: &Headers) -> Result<Option<u64>, Error> {
    let mut value: Option<u64> = None;
    for h in headers.find(CONTENT_LENGTH) {
        let bytes = h.value.as_ref();
        if bytes.is_empty() || !bytes.iter().all(|&b| b.is_ascii_digit()) {
            return Err(Error::bad_message(format!(
                "invalid Content-Length: {:?}",
                String::from_utf8_lossy(bytes)
            )));
        }
        let s = std::str::from_utf8(bytes).unwrap();
        let n: u64 = s.parse().map_err(|_| {
            Error::bad_message(format!("invalid Content-Length: {:?}", s))
        })?;
        match value {
            None => value = Some(n),
            Some(existing) if existing == n => {}
            Some(_) => {
                return Err(Error::bad_message(
                    "duplicate Content-Length values disagree",
                ))
            }
        }
    }
    Ok(value)
}

const KNOWN_TRANSFER_CODINGS: &[&[u8]] = &[b"chunked", b"compress", b"deflate", b"gzip"];

/// Returns whether the message is chunked, validating Transfer-Encoding
/// framing rules (§4.1): "chunked" must be the last token if present; TE
/// and Content-Length may not both be present.
///
/// Unknown tokens that precede a trailing "chunked" are tolerated (they are
/// logically unwrapped by whatever already consumed them before reaching
/// this connection) -- only a non-final "chunked", or TE co-occurring with
/// Content-Length, is rejected. See DESIGN.md for why this takes priority
/// over the stricter "every non-chunked token must be a known coding"
/// phrasing.
pub fn is_chunked(headers: &Headers, is_request: bool) -> Result<bool, Error> {
    let mut any_te = false;
    let mut last_token: Option<Vec<u8>> = None;
    let mut saw_non_final_chunked = false;

    for h in headers.find(TRANSFER_ENCODING) {
        for token in comma_tokens(h.value.as_ref()) {
            any_te = true;
            if let Some(prev) = last_token.take() {
                if prev.eq_ignore_ascii_case(b"chunked") {
                    saw_non_final_chunked = true;
                }
            }
            last_token = Some(token);
        }
    }

    if !any_te {
        return Ok(false);
    }

    if saw_non_final_chunked {
        return Err(Error::bad_message("invalid Transfer-Encoding: chunked is not last"));
    }

    if headers.has(CONTENT_LENGTH) {
        return Err(Error::bad_message(
            "message has both Transfer-Encoding and Content-Length",
        ));
    }

    let is_chunked_final = last_token
        .as_deref()
        .map(|t| t.eq_ignore_ascii_case(b"chunked"))
        .unwrap_or(false);

    if is_request && !is_chunked_final {
        // A request whose Transfer-Encoding doesn't end in chunked has no
        // reliably determinable length; RFC 9112 requires closing the
        // connection with 400 rather than guessing.
        if last_token
            .as_deref()
            .map(|t| !KNOWN_TRANSFER_CODINGS.iter().any(|k| t.eq_ignore_ascii_case(k)))
            .unwrap_or(false)
        {
            return Err(Error::bad_message(format!(
                "unsupported Transfer-Encoding token: {:?}",
                last_token.map(|t| String::from_utf8_lossy(&t).into_owned())
            )));
        }
    }

    Ok(is_chunked_final)
}

/// `Connection` header tokens, lowercased, comma-split.
pub fn connection_tokens(headers: &Headers) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for h in headers.find(CONNECTION) {
        for token in comma_tokens(h.value.as_ref()) {
            out.push(token.to_ascii_lowercase());
        }
    }
    out
}

pub fn should_close(version: crate::version::HttpVersion, headers: &Headers) -> bool {
    let tokens = connection_tokens(headers);
    if version < crate::version::HTTP_1_1 {
        !tokens.iter().any(|t| t == b"keep-alive")
    } else {
        tokens.iter().any(|t| t == b"close")
    }
}

/// `upgrade` is only true if Connection asks for it *and* an Upgrade header
/// actually names a target protocol.
pub fn is_upgrade(headers: &Headers) -> bool {
    let tokens = connection_tokens(headers);
    tokens.iter().any(|t| t == b"upgrade") && headers.has(UPGRADE)
}

/// Content-Encoding, mapped to a supported coding. Unknown encodings
/// (including "compress") and an empty header both mean "pass the body
/// through unchanged".
pub fn content_encoding(headers: &Headers) -> Option<Coding> {
    let mut tokens = Vec::new();
    for h in headers.find(CONTENT_ENCODING) {
        tokens.extend(comma_tokens(h.value.as_ref()));
    }
    // Only a single encoding is supported for decoding; if more than one is
    // stacked we only look at the outermost (last) one, matching the
    // dispatch-by-last-token pattern used for Transfer-Encoding.
    Coding::from_token(tokens.last()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(h: &mut Headers, name: &str, value: &str) {
        h.push(Bytes::from(name.to_string()), Bytes::from(value.to_string()));
    }

    #[test]
    fn find_is_case_insensitive_and_order_preserving() {
        let mut h = Headers::new();
        push(&mut h, "test", "a line");
        push(&mut h, "Test2", "data");
        push(&mut h, "TEST", "second");

        let values: Vec<_> = h.find(b"test").map(|f| f.value.clone()).collect();
        assert_eq!(values, vec![Bytes::from("a line"), Bytes::from("second")]);
        assert_eq!(h.raw_headers().len(), 3);
    }

    #[test]
    fn content_length_duplicates_must_agree() {
        let mut h = Headers::new();
        push(&mut h, "Content-Length", "5");
        push(&mut h, "Content-Length", "5");
        assert_eq!(parse_content_length(&h).unwrap(), Some(5));

        let mut h2 = Headers::new();
        push(&mut h2, "Content-Length", "5");
        push(&mut h2, "Content-Length", "6");
        assert!(parse_content_length(&h2).is_err());
    }

    #[test]
    fn transfer_encoding_requires_chunked_last() {
        let mut h = Headers::new();
        push(&mut h, "Transfer-Encoding", "chunked, not");
        assert!(is_chunked(&h, true).is_err());

        let mut h2 = Headers::new();
        push(&mut h2, "Transfer-Encoding", "not, chunked");
        assert!(is_chunked(&h2, true).unwrap());
    }

    #[test]
    fn transfer_encoding_and_content_length_conflict() {
        let mut h = Headers::new();
        push(&mut h, "Transfer-Encoding", "chunked");
        push(&mut h, "Content-Length", "5");
        assert!(is_chunked(&h, true).is_err());
    }

    #[test]
    fn upgrade_requires_both_tokens() {
        let mut h = Headers::new();
        push(&mut h, "Connection", "upgrade");
        assert!(!is_upgrade(&h));
        push(&mut h, "Upgrade", "websocket");
        assert!(is_upgrade(&h));
    }

    #[test]
    fn content_encoding_maps_known_codings_only() {
        let mut h = Headers::new();
        push(&mut h, "Content-Encoding", "gzip");
        assert_eq!(content_encoding(&h), Some(Coding::Gzip));

        let mut h2 = Headers::new();
        push(&mut h2, "Content-Encoding", "compress");
        assert_eq!(content_encoding(&h2), None);

        let mut h3 = Headers::new();
        push(&mut h3, "Content-Encoding", "");
        assert_eq!(content_encoding(&h3), None);
    }
}
