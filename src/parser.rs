//! `MessageParser`: the top-level incremental driver.
//!
//! Generalizes the teacher's `MessageParser`/`ClientConnection` pull loop
//! (`message_parser.rs`, `message_syntax.rs`), which pulls lines and bytes
//! out of a `StreamReader` as needed, into a push-based driver: `feed_data`
//! is handed whatever bytes the transport currently has and runs the same
//! head/body state machine the teacher's loop runs, just without blocking
//! between steps.

use bytes::Bytes;

use crate::error::Error;
use crate::head::{HeadersParser, Limits, RequestHead, ResponseHead};
use crate::headers::Headers;
use crate::payload::{select_body_mode, PayloadParser};
use crate::sink::{body_sink, BodySink, BodySinkWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Request,
    Response,
}

/// A parsed head, tagged by which role produced it.
#[derive(Debug, Clone)]
pub enum Head {
    Request(RequestHead),
    Response(ResponseHead),
}

impl Head {
    pub fn headers(&self) -> &Headers {
        match self {
            Head::Request(h) => &h.headers,
            Head::Response(h) => &h.headers,
        }
    }

    pub fn should_close(&self) -> bool {
        match self {
            Head::Request(h) => h.should_close,
            Head::Response(h) => h.should_close,
        }
    }

    pub fn upgrade(&self) -> bool {
        match self {
            Head::Request(h) => h.upgrade,
            Head::Response(h) => h.upgrade,
        }
    }

    pub fn chunked(&self) -> bool {
        match self {
            Head::Request(h) => h.chunked,
            Head::Response(h) => h.chunked,
        }
    }

    pub fn as_request(&self) -> Option<&RequestHead> {
        match self {
            Head::Request(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseHead> {
        match self {
            Head::Response(h) => Some(h),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Body-sink high-water mark, in bytes.
    pub limit: usize,
    pub max_line_size: usize,
    pub max_field_size: usize,
    /// Response only: with no Content-Length/Transfer-Encoding, treat the
    /// body as EOF-delimited instead of no-body.
    pub read_until_eof: bool,
    /// Response only: false forces no-body (the paired request was HEAD).
    /// Checked once per emitted response and left at `true` afterwards --
    /// callers parsing a stream of responses toggle it with
    /// `expect_no_body_response` before each `feed_data` that corresponds
    /// to a HEAD request.
    pub response_with_body: bool,
    /// The "dev/strict" toggle from §6.
    pub strict: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            limit: 64 * 1024,
            max_line_size: 8190,
            max_field_size: 8190,
            read_until_eof: false,
            response_with_body: true,
            strict: false,
        }
    }
}

enum Phase {
    ReadHead,
    ReadBody {
        payload: PayloadParser,
        should_close: bool,
    },
}

pub struct FeedOutput {
    pub messages: Vec<(Head, BodySink)>,
    pub upgrade: bool,
    pub tail: Bytes,
}

pub struct MessageParser {
    role: Role,
    buf: Vec<u8>,
    phase: Phase,
    options: ParserOptions,
    headers_parser: HeadersParser,
    /// Set once an emitted message had `should_close=true`; any further
    /// non-empty input is then a framing violation.
    closed: bool,
}

impl MessageParser {
    pub fn new_request(options: ParserOptions) -> Self {
        Self::new(Role::Request, options)
    }

    pub fn new_response(options: ParserOptions) -> Self {
        Self::new(Role::Response, options)
    }

    fn new(role: Role, options: ParserOptions) -> Self {
        let limits = Limits {
            max_line_size: options.max_line_size,
            max_field_size: options.max_field_size,
        };
        let headers_parser = HeadersParser::new(limits, options.strict);
        MessageParser {
            role,
            buf: Vec::new(),
            phase: Phase::ReadHead,
            options,
            headers_parser,
            closed: false,
        }
    }

    /// One-shot: the next response head this parser emits corresponds to a
    /// HEAD request and therefore carries no body regardless of its
    /// headers. Only meaningful on a response-role parser.
    pub fn expect_no_body_response(&mut self) {
        self.options.response_with_body = false;
    }

    pub fn feed_data(&mut self, data: &[u8]) -> Result<FeedOutput, Error> {
        self.buf.extend_from_slice(data);
        let mut messages = Vec::new();

        loop {
            match &mut self.phase {
                Phase::ReadHead => {
                    // Leading CRLFs before a start line are silently
                    // consumed (bug-for-bug with widely deployed parsers).
                    let mut start = 0;
                    while start < self.buf.len() && (self.buf[start] == b'\r' || self.buf[start] == b'\n') {
                        start += 1;
                    }
                    if start > 0 {
                        self.buf.drain(..start);
                    }

                    if self.closed && !self.buf.is_empty() {
                        return Err(Error::bad_message("data received after Connection: close"));
                    }

                    let boundary = memchr::memmem::find(&self.buf, b"\r\n\r\n");
                    let Some(idx) = boundary else {
                        if self.buf.len() > self.options.max_line_size {
                            return Err(Error::line_too_long(self.buf.len(), self.options.max_line_size));
                        }
                        break;
                    };

                    let head_bytes = self.buf[..idx].to_vec();
                    let consumed = idx + 4;

                    let head = self.parse_head(&head_bytes)?;
                    self.buf.drain(..consumed);

                    let (writer, reader) = body_sink(self.options.limit);
                    let payload = self.build_payload(&head, writer)?;
                    let should_close = head.should_close();
                    let is_upgrade_request = self.role == Role::Request && head.upgrade();

                    messages.push((head, reader));

                    if is_upgrade_request {
                        let tail = Bytes::copy_from_slice(&self.buf);
                        self.buf.clear();
                        return Ok(FeedOutput {
                            messages,
                            upgrade: true,
                            tail,
                        });
                    }

                    // After a HEAD-paired response, the one-shot override
                    // only applies to that single message.
                    self.options.response_with_body = true;
                    self.phase = Phase::ReadBody { payload, should_close };
                }
                Phase::ReadBody { payload, should_close } => {
                    if !self.buf.is_empty() {
                        let n = payload.feed(&self.buf)?;
                        self.buf.drain(..n);
                    }
                    if payload.is_done() {
                        if *should_close {
                            self.closed = true;
                        }
                        self.phase = Phase::ReadHead;
                    } else {
                        break;
                    }
                }
            }
        }

        Ok(FeedOutput {
            messages,
            upgrade: false,
            tail: Bytes::new(),
        })
    }

    /// Finalizes whatever body is in flight. Length-mode and chunked-mode
    /// bodies that have not completed report their error on the sink (and
    /// here); EOF-mode bodies treat this as their expected terminator.
    pub fn feed_eof(&mut self) -> Result<(), Error> {
        if let Phase::ReadBody { payload, .. } = &mut self.phase {
            payload.feed_eof()?;
        }
        Ok(())
    }

    fn parse_head(&self, head_bytes: &[u8]) -> Result<Head, Error> {
        Ok(match self.role {
            Role::Request => Head::Request(self.headers_parser.parse_request(head_bytes)?),
            Role::Response => Head::Response(self.headers_parser.parse_response(head_bytes)?),
        })
    }

    fn build_payload(&self, head: &Head, writer: BodySinkWriter) -> Result<PayloadParser, Error> {
        let (is_request, is_head_response, status_no_body) = match head {
            Head::Request(r) => (true, r.method.is_head(), false),
            Head::Response(r) => (
                false,
                !self.options.response_with_body,
                crate::payload::status_implies_no_body(r.code),
            ),
        };
        let mode = select_body_mode(
            is_request,
            is_head_response,
            status_no_body,
            head.headers(),
            self.options.read_until_eof,
        )?;
        let coding = crate::headers::content_encoding(head.headers());
        PayloadParser::new(mode, coding, writer, !self.options.strict, is_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_body(sink: &BodySink) -> Bytes {
        sink.try_read_all().unwrap_or_default()
    }

    #[test]
    fn scenario_simple_request_no_body() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let out = p
            .feed_data(b"GET /test HTTP/1.1\r\ntest: a line\r\ntest2: data\r\n\r\n")
            .unwrap();
        assert_eq!(out.messages.len(), 1);
        assert!(!out.upgrade);
        assert_eq!(drain_body(&out.messages[0].1), Bytes::new());
    }

    #[test]
    fn scenario_chunked_request_body() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let input = b"GET /test HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\ndata\r\n4\r\nline\r\n0\r\n\r\n";
        let out = p.feed_data(input).unwrap();
        assert_eq!(out.messages.len(), 1);
        assert_eq!(drain_body(&out.messages[0].1), Bytes::from("dataline"));
    }

    #[test]
    fn scenario_transfer_encoding_then_content_length_is_rejected() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let input = b"GET / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nTransfer-Encoding: a\r\n\r\napple\r\n";
        assert!(p.feed_data(input).is_err());
    }

    #[test]
    fn scenario_not_then_chunked_tolerates_unknown_leading_token() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let input = b"GET /test HTTP/1.1\r\nTransfer-Encoding: not, chunked\r\n\r\n1\r\nT\r\n3\r\nest\r\n0\r\n\r\n";
        let out = p.feed_data(input).unwrap();
        assert_eq!(drain_body(&out.messages[0].1), Bytes::from("Test"));
    }

    #[test]
    fn scenario_chunked_not_last_is_rejected() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let input = b"GET /test HTTP/1.1\r\nTransfer-Encoding: chunked, not\r\n\r\n";
        assert!(p.feed_data(input).is_err());
    }

    #[test]
    fn scenario_two_pipelined_responses_split_anywhere() {
        let full = b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nfirstHTTP/1.1 200 OK\r\ncontent-length: 6\r\n\r\nsecond";
        for split in 0..full.len() {
            let mut p = MessageParser::new_response(ParserOptions::default());
            let mut out = p.feed_data(&full[..split]).unwrap();
            let out2 = p.feed_data(&full[split..]).unwrap();
            out.messages.extend(out2.messages);
            assert_eq!(out.messages.len(), 2, "split at {split}");
            assert_eq!(drain_body(&out.messages[0].1), Bytes::from("first"));
            assert_eq!(drain_body(&out.messages[1].1), Bytes::from("second"));
        }
    }

    #[test]
    fn scenario_header_starting_with_whitespace_as_first_header_rejected() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let input = b"GET / HTTP/1.1\r\n leading: oops\r\n\r\n";
        assert!(p.feed_data(input).is_err());
    }

    #[test]
    fn scenario_cr_smuggling_in_header_value_rejected() {
        let mut p = MessageParser::new_request(ParserOptions::default());
        let input = b"POST / HTTP/1.1\r\nHost: localhost:8080\r\nX-Abc: \rxTransfer-Encoding: chunked\r\n\r\n";
        assert!(p.feed_data(input).is_err());
    }

    #[test]
    fn data_after_connection_close_is_rejected() {
        let mut p = MessageParser::new_response(ParserOptions::default());
        let first = b"HTTP/1.1 200 OK\r\nConnection: close\r\ncontent-length: 2\r\n\r\nhi";
        p.feed_data(first).unwrap();
        let err = p.feed_data(b"GET / HTTP/1.1\r\n\r\n");
        assert!(err.is_err());
    }

    #[test]
    fn length_mode_eof_without_enough_bytes_errors_on_feed_eof() {
        let mut p = MessageParser::new_response(ParserOptions::default());
        p.feed_data(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nhi").unwrap();
        assert!(p.feed_eof().is_err());
    }

    #[test]
    fn read_until_eof_mode_used_when_requested_and_no_framing_present() {
        let mut opts = ParserOptions::default();
        opts.read_until_eof = true;
        let mut p = MessageParser::new_response(opts);
        let out = p.feed_data(b"HTTP/1.1 200 OK\r\n\r\nall the bytes").unwrap();
        assert_eq!(out.messages.len(), 1);
        p.feed_eof().unwrap();
        assert_eq!(drain_body(&out.messages[0].1), Bytes::from("all the bytes"));
    }

    #[test]
    fn head_response_override_forces_no_body() {
        let mut p = MessageParser::new_response(ParserOptions::default());
        p.expect_no_body_response();
        let out = p
            .feed_data(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nHTTP/1.1 200 OK\r\n\r\n")
            .unwrap();
        assert_eq!(out.messages.len(), 2);
        assert_eq!(drain_body(&out.messages[0].1), Bytes::new());
    }
}
