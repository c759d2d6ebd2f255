//! `HeadersParser`: parses one head block (request-line/status-line plus
//! header fields) out of an already-framed byte slice.
//!
//! Generalizes the teacher's `HttpHeadParser`-style line walking (scattered
//! across `message_parser.rs`/`header_parser.rs`) from a pull-based reader
//! over a `StreamReader` into a pure function over a `&[u8]` slice: the
//! `MessageParser` locates the CRLF CRLF boundary itself and calls in here
//! with exactly the bytes of one head.

use bytes::Bytes;

use crate::ascii::{is_digit, is_field_vchar, is_htab, is_sp, is_tchar, trim_ows};
use crate::error::Error;
use crate::header::*;
use crate::headers::Headers;
use crate::method::Method;
use crate::status::StatusCode;
use crate::uri::{parse_request_target, RequestTarget};
use crate::version::HttpVersion;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_line_size: usize,
    pub max_field_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_line_size: 8190,
            max_field_size: 8190,
        }
    }
}

pub struct HeadersParser {
    pub limits: Limits,
    /// The "dev/strict" toggle (§6): enables the stricter of each documented
    /// divergence (reject obs-fold in responses, reject lax chunked
    /// whitespace -- the latter is consumed by `chunked.rs`, not here).
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: RequestTarget,
    pub version: HttpVersion,
    pub headers: Headers,
    pub should_close: bool,
    pub compression: Option<crate::headers::Coding>,
    pub upgrade: bool,
    pub chunked: bool,
}

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: HttpVersion,
    pub code: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub should_close: bool,
    pub compression: Option<crate::headers::Coding>,
    pub upgrade: bool,
    pub chunked: bool,
}

impl HeadersParser {
    pub fn new(limits: Limits, strict: bool) -> Self {
        HeadersParser { limits, strict }
    }

    pub fn parse_request(&self, head: &[u8]) -> Result<RequestHead, Error> {
        let lines = self.split_lines(head, false)?;
        let mut iter = lines.into_iter();
        let start = iter.next().ok_or_else(|| Error::bad_status_line("empty head"))?;
        if start.len() > self.limits.max_line_size {
            return Err(Error::line_too_long(start.len(), self.limits.max_line_size));
        }
        let (method, target, version) = parse_request_line(start)?;

        let headers = self.parse_header_lines(iter, false)?;
        let (should_close, compression, upgrade, chunked) = derive_fields(&headers, version, true)?;

        Ok(RequestHead {
            method,
            target,
            version,
            headers,
            should_close,
            compression,
            upgrade,
            chunked,
        })
    }

    pub fn parse_response(&self, head: &[u8]) -> Result<ResponseHead, Error> {
        let lines = self.split_lines(head, true)?;
        let mut iter = lines.into_iter();
        let start = iter.next().ok_or_else(|| Error::bad_status_line("empty head"))?;
        if start.len() > self.limits.max_line_size {
            return Err(Error::line_too_long(start.len(), self.limits.max_line_size));
        }
        let (version, code, reason) = parse_status_line(start)?;

        let headers = self.parse_header_lines(iter, true)?;
        let (should_close, compression, upgrade, chunked) = derive_fields(&headers, version, false)?;

        Ok(ResponseHead {
            version,
            code,
            reason,
            headers,
            should_close,
            compression,
            upgrade,
            chunked,
        })
    }

    /// Splits `head` on line terminators. Bare LF (no preceding CR) is only
    /// ever tolerated for responses in lenient mode -- the asymmetry from
    /// the spec's open question is preserved rather than aligned.
    fn split_lines<'a>(&self, mut buf: &'a [u8], is_response: bool) -> Result<Vec<&'a [u8]>, Error> {
        let allow_bare_lf = is_response && !self.strict;
        let mut lines = Vec::new();
        while !buf.is_empty() {
            match find_terminator(buf, allow_bare_lf) {
                Some((line, consumed)) => {
                    lines.push(line);
                    buf = &buf[consumed..];
                }
                None => {
                    lines.push(buf);
                    break;
                }
            }
        }
        Ok(lines)
    }

    /// Merges obs-fold continuations into their parent line, validates each
    /// logical header line, and pushes the result into a `Headers` map.
    fn parse_header_lines<'a>(
        &self,
        lines: impl Iterator<Item = &'a [u8]>,
        is_response: bool,
    ) -> Result<Headers, Error> {
        let mut headers = Headers::new();
        let mut pending: Option<Vec<u8>> = None;
        let mut pending_len = 0usize;

        let strict = self.strict;
        let flush = |pending: &mut Option<Vec<u8>>, headers: &mut Headers| -> Result<(), Error> {
            if let Some(line) = pending.take() {
                push_header_line(headers, &line, strict)?;
            }
            Ok(())
        };

        for line in lines {
            let is_fold = line.first().map(|&b| is_sp(b) || is_htab(b)).unwrap_or(false);

            if is_fold {
                if pending.is_none() {
                    return Err(Error::bad_message(
                        "header block cannot start with a folded continuation line",
                    ));
                }
                if is_response {
                    if self.strict {
                        return Err(Error::bad_message(
                            "obsolete line folding is rejected in strict mode",
                        ));
                    }
                    log::debug!("accepting obsolete line folding in a response header (lenient mode)");
                } else {
                    return Err(Error::bad_message(
                        "obsolete line folding is not accepted in requests",
                    ));
                }
                let trimmed = trim_ows(line);
                pending_len += 1 + trimmed.len();
                if pending_len > self.limits.max_field_size {
                    return Err(Error::line_too_long(pending_len, self.limits.max_field_size));
                }
                let buf = pending.as_mut().unwrap();
                buf.push(b' ');
                buf.extend_from_slice(trimmed);
                continue;
            }

            flush(&mut pending, &mut headers)?;
            pending_len = line.len();
            if pending_len > self.limits.max_field_size {
                return Err(Error::line_too_long(pending_len, self.limits.max_field_size));
            }
            pending = Some(line.to_vec());
        }
        flush(&mut pending, &mut headers)?;
        Ok(headers)
    }
}

/// Locates the next line terminator. Returns the line content (without the
/// terminator) and the number of input bytes it and the terminator occupy.
fn find_terminator(buf: &[u8], allow_bare_lf: bool) -> Option<(&[u8], usize)> {
    let lf = memchr::memchr(b'\n', buf)?;
    if lf > 0 && buf[lf - 1] == b'\r' {
        Some((&buf[..lf - 1], lf + 1))
    } else if allow_bare_lf {
        log::debug!("accepting bare LF line terminator in a response (lenient mode)");
        Some((&buf[..lf], lf + 1))
    } else {
        None
    }
}

fn push_header_line(headers: &mut Headers, line: &[u8], strict: bool) -> Result<(), Error> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| Error::bad_message("header line has no colon and is not a fold continuation"))?;
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&b| is_tchar(b)) {
        return Err(Error::bad_message(format!(
            "invalid header field name: {:?}",
            String::from_utf8_lossy(name)
        )));
    }
    let raw_value = &line[colon + 1..];
    for &b in raw_value {
        if b == b'\r' || b == b'\n' || b == 0 {
            return Err(Error::bad_message("CR, LF, or NUL inside header value"));
        }
        if strict && !is_field_vchar(b) && !is_sp(b) && !is_htab(b) {
            return Err(Error::bad_message(format!(
                "control byte {:#04x} in header value is rejected in strict mode",
                b
            )));
        }
    }
    let value = trim_ows(raw_value);
    headers.push(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
    Ok(())
}

fn parse_request_line(line: &[u8]) -> Result<(Method, RequestTarget, HttpVersion), Error> {
    let first_sp = line
        .iter()
        .position(|&b| is_sp(b))
        .ok_or_else(|| Error::bad_status_line("request-line missing SP"))?;
    let method_bytes = &line[..first_sp];
    let rest = &line[first_sp + 1..];

    let second_sp = rest
        .iter()
        .position(|&b| is_sp(b))
        .ok_or_else(|| Error::bad_status_line("request-line missing second SP"))?;
    let target_bytes = &rest[..second_sp];
    let version_bytes = &rest[second_sp + 1..];

    let method = Method::parse(method_bytes)?;
    let target = parse_request_target(target_bytes)?;
    let version = parse_http_version(version_bytes)?;

    if matches!(target, RequestTarget::AuthorityForm { .. }) && !method.is_connect() {
        return Err(Error::bad_status_line(
            "authority-form request-target is only valid for CONNECT",
        ));
    }

    Ok((method, target, version))
}

fn parse_status_line(line: &[u8]) -> Result<(HttpVersion, StatusCode, String), Error> {
    let first_sp = line
        .iter()
        .position(|&b| is_sp(b))
        .ok_or_else(|| Error::bad_status_line("status-line missing SP"))?;
    let version = parse_http_version(&line[..first_sp])?;
    let rest = &line[first_sp + 1..];

    let second_sp = rest.iter().position(|&b| is_sp(b)).unwrap_or(rest.len());
    let code_bytes = &rest[..second_sp];
    if code_bytes.len() != 3 || !code_bytes.iter().all(|&b| is_digit(b)) {
        return Err(Error::bad_status_line(format!(
            "invalid status code: {:?}",
            String::from_utf8_lossy(code_bytes)
        )));
    }
    let code_val: u16 = std::str::from_utf8(code_bytes).unwrap().parse().unwrap();
    let code = StatusCode::from_u16(code_val)
        .ok_or_else(|| Error::bad_status_line(format!("status code out of range: {}", code_val)))?;

    let reason_bytes = if second_sp < rest.len() {
        &rest[second_sp + 1..]
    } else {
        &[]
    };
    let reason = String::from_utf8_lossy(reason_bytes).into_owned();

    Ok((version, code, reason))
}

/// `"HTTP/" DIGIT "." DIGIT`. Digits are checked byte-for-byte against the
/// ASCII range (`is_digit`) rather than `char::is_numeric`, which would
/// accept non-ASCII decimal digits a naive decode-then-check could miss.
fn parse_http_version(bytes: &[u8]) -> Result<HttpVersion, Error> {
    if bytes.len() != 8 || &bytes[..5] != b"HTTP/" || bytes[6] != b'.' {
        return Err(Error::bad_status_line(format!(
            "malformed HTTP-version: {:?}",
            String::from_utf8_lossy(bytes)
        )));
    }
    if !is_digit(bytes[5]) || !is_digit(bytes[7]) {
        return Err(Error::bad_status_line("HTTP-version digits must be ASCII 0-9"));
    }
    Ok(HttpVersion {
        major: bytes[5] - b'0',
        minor: bytes[7] - b'0',
    })
}

fn derive_fields(
    headers: &Headers,
    version: HttpVersion,
    is_request: bool,
) -> Result<(bool, Option<crate::headers::Coding>, bool, bool), Error> {
    if is_request && headers.has(SEC_WEBSOCKET_KEY1) {
        return Err(Error::bad_message("Sec-WebSocket-Key1 (draft-76) is not supported"));
    }
    let chunked = crate::headers::is_chunked(headers, is_request)?;
    // `is_chunked` already rejects TE+CL co-occurrence; still validate CL on
    // its own so a non-chunked message with a malformed Content-Length
    // fails here rather than silently defaulting to no-body.
    crate::headers::parse_content_length(headers)?;
    let should_close = crate::headers::should_close(version, headers);
    let compression = crate::headers::content_encoding(headers);
    let upgrade = crate::headers::is_upgrade(headers);
    Ok((should_close, compression, upgrade, chunked))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> HeadersParser {
        HeadersParser::new(Limits::default(), false)
    }

    #[test]
    fn scenario_simple_request_headers() {
        let head = b"GET /test HTTP/1.1\r\ntest: a line\r\ntest2: data\r\n";
        let parsed = parser().parse_request(head).unwrap();
        assert_eq!(parsed.method.as_str(), "GET");
        assert!(!parsed.should_close);
        assert!(!parsed.upgrade);
        assert!(!parsed.chunked);
        let values: Vec<_> = parsed.headers.raw_headers().iter().map(|h| h.value.clone()).collect();
        assert_eq!(values, vec![bytes::Bytes::from("a line"), bytes::Bytes::from("data")]);
    }

    #[test]
    fn scenario_transfer_encoding_and_content_length_conflict() {
        let head = b"GET / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nTransfer-Encoding: a\r\n";
        assert!(parser().parse_request(head).is_err());
    }

    #[test]
    fn scenario_header_line_starting_with_whitespace_as_first_header() {
        let head = b"GET / HTTP/1.1\r\n leading-fold: oops\r\n";
        assert!(parser().parse_request(head).is_err());
    }

    #[test]
    fn scenario_bare_cr_smuggling_attempt_is_rejected() {
        let head = b"POST / HTTP/1.1\r\nHost: localhost:8080\r\nX-Abc: \rxTransfer-Encoding: chunked\r\n";
        assert!(parser().parse_request(head).is_err());
    }

    #[test]
    fn status_line_parses_code_and_reason() {
        let head = b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n";
        let parsed = parser().parse_response(head).unwrap();
        assert_eq!(parsed.code.as_u16(), 200);
        assert_eq!(parsed.reason, "OK");
    }

    #[test]
    fn status_codes_outside_100_999_are_rejected() {
        let head99 = b"HTTP/1.1 099 Huh\r\n";
        assert!(parser().parse_response(head99).is_err());
    }

    #[test]
    fn obs_fold_rejected_in_requests_accepted_in_lenient_responses() {
        let req = b"GET / HTTP/1.1\r\nX-Long: part one\r\n part two\r\n";
        assert!(parser().parse_request(req).is_err());

        let resp = b"HTTP/1.1 200 OK\r\nX-Long: part one\r\n part two\r\n";
        let parsed = parser().parse_response(resp).unwrap();
        assert_eq!(
            parsed.headers.get_single(b"X-Long").unwrap().value.as_ref(),
            b"part one part two"
        );

        let strict_resp_parser = HeadersParser::new(Limits::default(), true);
        assert!(strict_resp_parser.parse_response(resp).is_err());
    }

    #[test]
    fn field_exactly_at_max_field_size_succeeds_one_more_fails() {
        let limits = Limits {
            max_line_size: 8190,
            max_field_size: 20,
        };
        let p = HeadersParser::new(limits, false);
        // "X-A: " (5) + value -> total line length must be <= 20.
        let ok_value = "a".repeat(15);
        let ok_head = format!("GET / HTTP/1.1\r\nX-A: {}\r\n", ok_value);
        assert_eq!(ok_head[16..].trim_end_matches("\r\n").len(), 20);
        assert!(p.parse_request(ok_head.as_bytes()).is_ok());

        let bad_value = "a".repeat(16);
        let bad_head = format!("GET / HTTP/1.1\r\nX-A: {}\r\n", bad_value);
        assert!(p.parse_request(bad_head.as_bytes()).is_err());
    }

    #[test]
    fn sec_websocket_key1_rejected_in_requests() {
        let head = b"GET / HTTP/1.1\r\nSec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n";
        assert!(parser().parse_request(head).is_err());
    }

    #[test]
    fn strict_mode_rejects_control_byte_in_header_value() {
        let head = b"HTTP/1.1 200 test\r\nFoo: abc\x01def\r\n\r\n";
        assert!(HeadersParser::new(Limits::default(), true).parse_response(head).is_err());
        assert!(parser().parse_response(head).is_ok());
    }

    #[test]
    fn authority_form_target_only_allowed_for_connect() {
        let connect = b"CONNECT example.com:443 HTTP/1.1\r\n";
        assert!(parser().parse_request(connect).is_ok());

        let get = b"GET example.com:443 HTTP/1.1\r\n";
        assert!(parser().parse_request(get).is_err());
    }
}
