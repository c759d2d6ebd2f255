//! Chunked transfer-coding state machine (RFC 9112 §7.1).
//!
//! Generalizes the teacher's `ChunkState` (`chunked.rs`), which drives a
//! pull-based `IncomingChunkedBody::read()` loop, into a push-based decoder:
//! `feed` is called repeatedly with whatever bytes are currently available
//! and returns how many of them it consumed, appending decoded chunk-data
//! to a caller-owned `Vec<u8>` and recording parsed trailers along the way.

use bytes::Bytes;

use crate::ascii::{is_hexdigit, is_htab, is_sp, trim_ows};
use crate::error::Error;
use crate::headers::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for `chunk-size [chunk-ext] CRLF`.
    Size,
    /// `remaining` bytes of chunk-data left, followed by a CRLF.
    Data { remaining: u64 },
    /// The CRLF that terminates a chunk-data block.
    DataCrlf,
    /// Reading `trailer-part`, one field line at a time, until the empty
    /// line that ends the message.
    Trailers,
    Done,
}

pub struct ChunkedDecoder {
    state: State,
    lenient: bool,
    /// Bare-LF line endings (no preceding CR) are only ever tolerated in
    /// response bodies, even in lax mode -- the same request/response
    /// asymmetry §9 calls out and `head.rs` already applies to header line
    /// terminators. Requests always require a full CRLF.
    allow_bare_lf: bool,
    trailers: Headers,
}

impl ChunkedDecoder {
    /// `lenient` is the `!strict` toggle (it governs trailing-whitespace
    /// tolerance after a chunk-size, which applies to both roles);
    /// `is_request` additionally gates bare-LF line-ending tolerance off for
    /// requests regardless of `lenient`.
    pub fn new(lenient: bool, is_request: bool) -> Self {
        ChunkedDecoder {
            state: State::Size,
            lenient,
            allow_bare_lf: lenient && !is_request,
            trailers: Headers::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    /// Consumes as much of `buf` as forms complete chunked-coding syntax,
    /// appending decoded chunk-data to `out`. Returns the number of bytes
    /// consumed; the caller keeps whatever remains for the next `feed` call
    /// once more bytes arrive. Flips to `Done` once the zero-length final
    /// chunk and trailer section are fully consumed.
    pub fn feed(&mut self, buf: &[u8], out: &mut Vec<u8>) -> Result<usize, Error> {
        let mut pos = 0;
        loop {
            match self.state {
                State::Done => return Ok(pos),
                State::Size => match find_line(&buf[pos..], self.allow_bare_lf) {
                    None => return Ok(pos),
                    Some(Err(lf)) => {
                        return Err(Error::transfer_encoding(
                            "embedded LF in chunk-size line",
                            &buf[pos..pos + lf + 1],
                        ))
                    }
                    Some(Ok((line, consumed))) => {
                        let size = parse_chunk_size(line, self.lenient)?;
                        pos += consumed;
                        self.state = if size == 0 {
                            State::Trailers
                        } else {
                            State::Data { remaining: size }
                        };
                    }
                },
                State::Data { remaining } => {
                    let available = (buf.len() - pos) as u64;
                    if available == 0 {
                        return Ok(pos);
                    }
                    let take = available.min(remaining) as usize;
                    out.extend_from_slice(&buf[pos..pos + take]);
                    pos += take;
                    let left = remaining - take as u64;
                    self.state = if left == 0 {
                        State::DataCrlf
                    } else {
                        State::Data { remaining: left }
                    };
                }
                State::DataCrlf => match find_line(&buf[pos..], self.allow_bare_lf) {
                    None => return Ok(pos),
                    Some(Err(lf)) => {
                        return Err(Error::transfer_encoding(
                            "expected CRLF after chunk-data",
                            &buf[pos..pos + lf + 1],
                        ))
                    }
                    Some(Ok((line, consumed))) => {
                        if !line.is_empty() {
                            return Err(Error::transfer_encoding(
                                "expected CRLF after chunk-data",
                                &buf[pos..pos + consumed],
                            ));
                        }
                        pos += consumed;
                        self.state = State::Size;
                    }
                },
                State::Trailers => match find_line(&buf[pos..], self.allow_bare_lf) {
                    None => return Ok(pos),
                    Some(Err(lf)) => {
                        return Err(Error::bad_message(format!(
                            "malformed trailer line (embedded LF): {:?}",
                            String::from_utf8_lossy(&buf[pos..pos + lf + 1])
                        )))
                    }
                    Some(Ok((line, consumed))) => {
                        pos += consumed;
                        if line.is_empty() {
                            self.state = State::Done;
                        } else {
                            push_trailer(&mut self.trailers, line)?;
                        }
                    }
                },
            }
        }
    }
}

/// Looks for a line terminator starting at the buffer front.
///
/// Returns `None` if no LF has arrived yet (the caller should wait for more
/// data). Returns `Some(Ok((line, consumed)))` once a valid terminator --
/// CRLF, or a bare LF when `allow_bare_lf` is set -- is found. Returns
/// `Some(Err(lf_index))` when an LF is found but isn't preceded by CR and
/// bare LF isn't allowed: that LF can never retroactively become a valid
/// terminator by waiting for more bytes, so it is reported as a malformed
/// line immediately rather than silently stalling (the embedded-LF
/// smuggling case: treating it as "incomplete" lets the bytes after the
/// stray LF be misread as a fresh chunk-size line).
fn find_line(buf: &[u8], allow_bare_lf: bool) -> Option<Result<(&[u8], usize), usize>> {
    let lf = memchr::memchr(b'\n', buf)?;
    if lf > 0 && buf[lf - 1] == b'\r' {
        Some(Ok((&buf[..lf - 1], lf + 1)))
    } else if allow_bare_lf {
        Some(Ok((&buf[..lf], lf + 1)))
    } else {
        Some(Err(lf))
    }
}

/// `chunk-size [ chunk-ext ] CRLF`; the extension, if present, is discarded
/// after a minimal syntax check.
fn parse_chunk_size(line: &[u8], lenient: bool) -> Result<u64, Error> {
    let size_part = match line.iter().position(|&b| b == b';') {
        Some(i) => &line[..i],
        None => line,
    };
    // Lenient mode tolerates trailing SP/HTAB before the ';' or CRLF, which
    // some older servers emit (matches the teacher's `chunked.rs` comment
    // on "lenient whitespace"); strict/dev mode rejects it outright.
    let has_trailing_blanks = size_part.last().map(|&b| is_sp(b) || is_htab(b)).unwrap_or(false);
    if has_trailing_blanks {
        if !lenient {
            return Err(Error::transfer_encoding(
                "chunk size has trailing whitespace",
                line,
            ));
        }
        log::debug!("accepting trailing whitespace after a chunk-size (lenient mode)");
    }
    let trimmed = trim_trailing_blanks(size_part);
    if trimmed.is_empty() || !trimmed.iter().all(|&b| is_hexdigit(b)) {
        return Err(Error::transfer_encoding("invalid chunk size", line));
    }
    let s = std::str::from_utf8(trimmed).map_err(|_| Error::transfer_encoding("invalid chunk size", line))?;
    u64::from_str_radix(s, 16).map_err(|_| Error::transfer_encoding("chunk size overflow", line))
}

fn trim_trailing_blanks(mut bytes: &[u8]) -> &[u8] {
    while let Some(&b) = bytes.last() {
        if is_sp(b) || is_htab(b) {
            bytes = &bytes[..bytes.len() - 1];
        } else {
            break;
        }
    }
    bytes
}

fn push_trailer(trailers: &mut Headers, line: &[u8]) -> Result<(), Error> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| Error::invalid_header("trailer field missing colon"))?;
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&b| crate::ascii::is_tchar(b)) {
        return Err(Error::invalid_header("invalid trailer field name"));
    }
    let value = trim_ows(&line[colon + 1..]);
    trailers.push(Bytes::copy_from_slice(name), Bytes::copy_from_slice(value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_chunk_with_terminator() {
        let mut dec = ChunkedDecoder::new(false, true);
        let mut out = Vec::new();
        let input = b"4\r\nWiki\r\n0\r\n\r\n";
        let consumed = dec.feed(input, &mut out).unwrap();
        assert_eq!(consumed, input.len());
        assert!(dec.is_done());
        assert_eq!(out, b"Wiki");
    }

    #[test]
    fn decodes_across_partial_feeds() {
        let mut dec = ChunkedDecoder::new(false, true);
        let mut out = Vec::new();
        let input = b"4\r\nWiki\r\n0\r\n\r\n";
        for chunk in input.chunks(3) {
            let mut offset = 0;
            while offset < chunk.len() {
                let n = dec.feed(&chunk[offset..], &mut out).unwrap();
                offset += n;
                if n == 0 {
                    break;
                }
            }
        }
        // Feed whole thing at once too, to sanity check the incremental path
        // produced the same total regardless of slicing.
        let mut dec2 = ChunkedDecoder::new(false, true);
        let mut out2 = Vec::new();
        dec2.feed(input, &mut out2).unwrap();
        assert_eq!(out2, b"Wiki");
        assert_eq!(out, b"Wiki");
        assert!(dec.is_done());
    }

    #[test]
    fn discards_chunk_extensions() {
        let mut dec = ChunkedDecoder::new(false, true);
        let mut out = Vec::new();
        let input = b"4;foo=bar\r\nWiki\r\n0\r\n\r\n";
        dec.feed(input, &mut out).unwrap();
        assert_eq!(out, b"Wiki");
    }

    #[test]
    fn parses_trailers() {
        let mut dec = ChunkedDecoder::new(false, true);
        let mut out = Vec::new();
        let input = b"0\r\nX-Checksum: abc\r\n\r\n";
        dec.feed(input, &mut out).unwrap();
        assert!(dec.is_done());
        assert_eq!(
            dec.trailers().get_single(b"X-Checksum").unwrap().value.as_ref(),
            b"abc"
        );
    }

    #[test]
    fn rejects_missing_data_crlf() {
        let mut dec = ChunkedDecoder::new(false, true);
        let mut out = Vec::new();
        let input = b"4\r\nWikiXX0\r\n\r\n";
        assert!(dec.feed(input, &mut out).is_err());
    }

    #[test]
    fn trailing_whitespace_in_chunk_size_is_strict_vs_lenient() {
        let input = b"4 \r\nWiki\r\n0\r\n\r\n";

        let mut strict = ChunkedDecoder::new(false, true);
        let mut out = Vec::new();
        assert!(strict.feed(input, &mut out).is_err());

        let mut lenient = ChunkedDecoder::new(true, false);
        let mut out2 = Vec::new();
        lenient.feed(input, &mut out2).unwrap();
        assert_eq!(out2, b"Wiki");
    }

    #[test]
    fn bare_lf_in_request_chunk_extension_is_rejected_even_when_lenient() {
        // A bare LF inside the chunk-size/extension field, with no CR, must
        // never be accepted for a request body -- even in lax mode -- or a
        // later chunk-size line like the "4c" here gets misread as its own
        // chunk, smuggling the next pipelined request's bytes in as body.
        let mut dec = ChunkedDecoder::new(true, true);
        let mut out = Vec::new();
        let input = b"2;\nxx\r\n4c\r\n0\r\n\r\n";
        assert!(dec.feed(input, &mut out).is_err());
    }

    #[test]
    fn bare_lf_in_response_chunk_size_is_accepted_only_when_lenient() {
        let input = b"4\nWiki\r\n0\n\n";

        let mut strict_response = ChunkedDecoder::new(false, false);
        let mut out = Vec::new();
        assert!(strict_response.feed(input, &mut out).is_err());

        let mut lenient_response = ChunkedDecoder::new(true, false);
        let mut out2 = Vec::new();
        lenient_response.feed(input, &mut out2).unwrap();
        assert_eq!(out2, b"Wiki");
        assert!(lenient_response.is_done());
    }

    #[test]
    fn bare_lf_is_never_accepted_for_requests() {
        let input = b"4\nWiki\r\n0\n\n";
        let mut dec = ChunkedDecoder::new(true, true);
        let mut out = Vec::new();
        assert!(dec.feed(input, &mut out).is_err());
    }
}
