//! Body-mode selection and driving, generalizing the teacher's
//! `IncomingBody`/`MessageBody` dispatch (`message_body.rs`) from a
//! pull-based `Body: Readable` trait object into a push-based
//! `PayloadParser::feed`/`feed_eof` pair.

use crate::chunked::ChunkedDecoder;
use crate::encoding::DecompressionFilter;
use crate::error::Error;
use crate::headers::{Coding, Headers};
use crate::sink::BodySinkWriter;

/// Which framing mode governs how many body bytes to expect, computed once
/// per message from its headers per RFC 9112 §6.3.
#[derive(Debug, Clone, Copy)]
pub enum BodyMode {
    /// No body at all (1xx/204/304 responses, HEAD responses, requests with
    /// neither Content-Length nor Transfer-Encoding).
    None,
    /// Exactly `len` bytes of body follow.
    Length(u64),
    /// `Transfer-Encoding: chunked` framing.
    Chunked,
    /// Body runs until the connection closes (only valid for responses).
    ReadUntilEof,
}

/// Implements the body-mode selection table: given the parsed start line
/// kind and headers, decide how the body is framed.
pub fn select_body_mode(
    is_request: bool,
    is_head_response: bool,
    status_class_1xx_204_304: bool,
    headers: &Headers,
    read_until_eof: bool,
) -> Result<BodyMode, Error> {
    if is_head_response || status_class_1xx_204_304 {
        return Ok(BodyMode::None);
    }

    if crate::headers::is_chunked(headers, is_request)? {
        return Ok(BodyMode::Chunked);
    }

    if let Some(len) = crate::headers::parse_content_length(headers)? {
        return Ok(BodyMode::Length(len));
    }

    if !is_request && read_until_eof {
        return Ok(BodyMode::ReadUntilEof);
    }

    Ok(BodyMode::None)
}

enum Decoder {
    Length { remaining: u64 },
    Chunked(ChunkedDecoder),
    ReadUntilEof,
    None,
}

/// Drives one message body to completion: unwraps the chosen `BodyMode`,
/// feeds transport bytes through it, and (if a `Content-Encoding` applies)
/// through a `DecompressionFilter` before reaching the caller's `BodySink`.
pub struct PayloadParser {
    decoder: Decoder,
    filter: Option<DecompressionFilter>,
    sink: BodySinkWriter,
    deflate_sniffed: bool,
    /// Reused across `feed` calls to collect one batch of chunk-data bytes
    /// before handing them to the decompression filter.
    chunk_scratch: Vec<u8>,
}

impl PayloadParser {
    pub fn new(
        mode: BodyMode,
        coding: Option<Coding>,
        sink: BodySinkWriter,
        lenient: bool,
        is_request: bool,
    ) -> Result<Self, Error> {
        let decoder = match mode {
            BodyMode::None => {
                sink.end();
                Decoder::None
            }
            BodyMode::Length(0) => {
                sink.end();
                Decoder::None
            }
            BodyMode::Length(n) => Decoder::Length { remaining: n },
            BodyMode::Chunked => Decoder::Chunked(ChunkedDecoder::new(lenient, is_request)),
            BodyMode::ReadUntilEof => Decoder::ReadUntilEof,
        };

        // `deflate` needs a peek at its first bytes before the right filter
        // variant (raw vs zlib-wrapped) can be chosen; every other coding
        // can be constructed immediately.
        let deflate_sniffed = !matches!(coding, Some(Coding::Deflate));
        let filter = if deflate_sniffed {
            Some(DecompressionFilter::new(coding, sink.clone())?)
        } else {
            None
        };

        Ok(PayloadParser {
            decoder,
            filter,
            sink,
            deflate_sniffed,
            chunk_scratch: Vec::new(),
        })
    }

    pub fn is_done(&self) -> bool {
        match &self.decoder {
            Decoder::None => true,
            Decoder::Length { remaining } => *remaining == 0,
            Decoder::Chunked(c) => c.is_done(),
            Decoder::ReadUntilEof => false,
        }
    }

    fn ensure_filter(&mut self, first_bytes: &[u8]) {
        if !self.deflate_sniffed {
            self.filter = Some(DecompressionFilter::sniff_deflate(first_bytes, self.sink.clone()));
            self.deflate_sniffed = true;
        }
    }

    fn emit(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.ensure_filter(data);
        match &mut self.filter {
            Some(f) => f.feed(data),
            None => {
                self.sink.push(data);
                Ok(())
            }
        }
    }

    /// Consumes as much of `buf` as the current mode allows, returning bytes
    /// consumed. For `Length`/`Chunked` modes this can be less than
    /// `buf.len()` once the body is complete (trailing pipelined data is
    /// left for the next message). `ReadUntilEof` always consumes
    /// everything, since it has no other terminator.
    pub fn feed(&mut self, buf: &[u8]) -> Result<usize, Error> {
        // Every branch below needs to call back into `self.emit`, so the
        // decoder is always taken out of `self` first rather than matched
        // by reference -- a live `&mut self.decoder` borrow would conflict
        // with the `&mut self` that `emit` needs.
        let decoder = std::mem::replace(&mut self.decoder, Decoder::None);
        match decoder {
            Decoder::None => Ok(0),
            Decoder::Length { remaining } => {
                let take = remaining.min(buf.len() as u64) as usize;
                self.emit(&buf[..take])?;
                let left = remaining - take as u64;
                self.decoder = Decoder::Length { remaining: left };
                if left == 0 {
                    self.finish_ok()?;
                }
                Ok(take)
            }
            Decoder::Chunked(mut chunked) => {
                self.chunk_scratch.clear();
                let consumed = chunked.feed(buf, &mut self.chunk_scratch)?;
                if !self.chunk_scratch.is_empty() {
                    let scratch = std::mem::take(&mut self.chunk_scratch);
                    self.emit(&scratch)?;
                    self.chunk_scratch = scratch;
                }
                let done = chunked.is_done();
                self.decoder = Decoder::Chunked(chunked);
                if done {
                    self.finish_ok()?;
                }
                Ok(consumed)
            }
            Decoder::ReadUntilEof => {
                self.decoder = Decoder::ReadUntilEof;
                self.emit(buf)?;
                Ok(buf.len())
            }
        }
    }

    fn finish_ok(&mut self) -> Result<(), Error> {
        if let Some(filter) = self.filter.take() {
            filter.finish()?;
        }
        self.sink.end();
        Ok(())
    }

    /// Called when the transport reaches EOF while this payload is still
    /// open. `Length`/`Chunked` modes that haven't finished are framing
    /// errors; `ReadUntilEof` treats it as the expected terminator.
    pub fn feed_eof(&mut self) -> Result<(), Error> {
        match &self.decoder {
            Decoder::None => Ok(()),
            Decoder::Length { remaining } if *remaining > 0 => {
                self.sink.fail(Error::ContentLengthError);
                Err(Error::ContentLengthError)
            }
            Decoder::Length { .. } => Ok(()),
            Decoder::Chunked(c) if !c.is_done() => {
                let err = Error::bad_message("connection closed mid-chunked-body");
                self.sink.fail(err.clone());
                Err(err)
            }
            Decoder::Chunked(_) => Ok(()),
            Decoder::ReadUntilEof => self.finish_ok(),
        }
    }
}

pub fn status_implies_no_body(status: crate::status::StatusCode) -> bool {
    status.is_informational() || status == crate::status::NO_CONTENT || status == crate::status::NOT_MODIFIED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::body_sink;
    use bytes::Bytes;

    #[test]
    fn length_mode_stops_after_declared_bytes_and_keeps_remainder() {
        let (w, r) = body_sink(1024);
        let mut payload = PayloadParser::new(BodyMode::Length(5), None, w, false, true).unwrap();
        let consumed = payload.feed(b"helloEXTRA").unwrap();
        assert_eq!(consumed, 5);
        assert!(payload.is_done());
        assert_eq!(r.try_read_all().unwrap(), Bytes::from("hello"));
    }

    #[test]
    fn length_mode_eof_before_complete_is_error() {
        let (w, r) = body_sink(1024);
        let mut payload = PayloadParser::new(BodyMode::Length(10), None, w, false, true).unwrap();
        payload.feed(b"short").unwrap();
        assert!(payload.feed_eof().is_err());
        assert!(r.try_read_all().is_err());
    }

    #[test]
    fn read_until_eof_mode_consumes_everything_until_feed_eof() {
        let (w, r) = body_sink(1024);
        let mut payload = PayloadParser::new(BodyMode::ReadUntilEof, None, w, false, false).unwrap();
        payload.feed(b"all of it").unwrap();
        payload.feed_eof().unwrap();
        assert_eq!(r.try_read_all().unwrap(), Bytes::from("all of it"));
    }

    #[test]
    fn chunked_mode_reports_completion() {
        let (w, r) = body_sink(1024);
        let mut payload = PayloadParser::new(BodyMode::Chunked, None, w, false, true).unwrap();
        let input = b"4\r\nWiki\r\n0\r\n\r\n";
        payload.feed(input).unwrap();
        assert!(payload.is_done());
        assert_eq!(r.try_read_all().unwrap(), Bytes::from("Wiki"));
    }
}
