//! `BodySink`: the byte-buffered, cooperative reader the parser pushes body
//! bytes into.
//!
//! This generalizes the teacher's `StreamReader` (`reader.rs`), which pulls
//! bytes *from* an `Arc<dyn Readable>` transport on demand, into the
//! opposite direction required by this spec: the `MessageParser` is the
//! producer and pushes bytes as `feed_data` receives them; the caller's
//! body-reading future is the consumer. It is a small bounded
//! producer/consumer channel with a high-water mark for backpressure and a
//! one-shot error slot, deliberately not tied to any particular async
//! runtime (the spec treats transport I/O as an external collaborator).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;

use crate::error::Error;

#[derive(Debug)]
struct Inner {
    queue: VecDeque<u8>,
    /// Set exactly once, either by `end()` (clean EOF) or `fail()`.
    ended: bool,
    error: Option<Error>,
    waker: Option<Waker>,
    high_water_mark: usize,
}

/// Producer handle, held by the `MessageParser` / `PayloadParser`.
#[derive(Clone)]
pub struct BodySinkWriter {
    inner: Arc<Mutex<Inner>>,
}

/// Consumer handle, held by the caller reading the body.
#[derive(Clone)]
pub struct BodySink {
    inner: Arc<Mutex<Inner>>,
}

/// Creates a linked producer/consumer pair sharing one bounded buffer.
pub fn body_sink(high_water_mark: usize) -> (BodySinkWriter, BodySink) {
    let inner = Arc::new(Mutex::new(Inner {
        queue: VecDeque::new(),
        ended: false,
        error: None,
        waker: None,
        high_water_mark,
    }));
    (
        BodySinkWriter {
            inner: inner.clone(),
        },
        BodySink { inner },
    )
}

impl BodySinkWriter {
    /// Pushes bytes received in order. Must not be called after `end()` or
    /// `fail()`.
    pub fn push(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(!inner.ended, "pushed bytes into a BodySink after EOF/error");
        inner.queue.extend(bytes.iter().copied());
        wake(&mut inner);
    }

    /// Signals end-of-body. Must be called exactly once per sink.
    pub fn end(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.ended = true;
        wake(&mut inner);
    }

    /// Sets the sink's exception; the reading side observes it the next
    /// time it polls. Also marks the sink ended (exactly one EOF signal,
    /// whether clean or an error, per §3's invariant).
    pub fn fail(&self, error: Error) {
        let mut inner = self.inner.lock().unwrap();
        if inner.error.is_none() {
            inner.error = Some(error);
        }
        inner.ended = true;
        wake(&mut inner);
    }

    /// True when the buffered bytes are at or above the high-water mark;
    /// the transport layer should pause reading until this goes false.
    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.queue.len() >= inner.high_water_mark
    }
}

fn wake(inner: &mut Inner) {
    if let Some(w) = inner.waker.take() {
        w.wake();
    }
}

impl BodySink {
    /// Non-blocking read: returns whatever is buffered (up to `max`), `Ok(0)`
    /// once ended with no error, or the sink's error.
    pub fn poll_read(&self, cx: &mut Context<'_>, max: usize) -> Poll<Result<Bytes, Error>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.queue.is_empty() {
            let n = max.min(inner.queue.len());
            let chunk: Vec<u8> = inner.queue.drain(..n).collect();
            return Poll::Ready(Ok(Bytes::from(chunk)));
        }
        if let Some(e) = inner.error.clone() {
            return Poll::Ready(Err(e));
        }
        if inner.ended {
            return Poll::Ready(Ok(Bytes::new()));
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Convenience accessor for tests and simple synchronous callers that
    /// want the whole body in one shot: unlike `poll_read`, which hands back
    /// buffered bytes before surfacing a pending error on the next call,
    /// this treats a failed sink as a single failed read regardless of how
    /// much was buffered before the failure.
    pub fn try_read_all(&self) -> Result<Bytes, Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = inner.error.clone() {
            return Err(e);
        }
        let chunk: Vec<u8> = inner.queue.drain(..).collect();
        Ok(Bytes::from(chunk))
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().unwrap().ended
    }
}

/// A `Future` wrapper around `BodySink::poll_read`, so callers on any
/// executor can simply `.await` a chunk.
pub struct ReadChunk<'a> {
    pub sink: &'a BodySink,
    pub max: usize,
}

impl<'a> std::future::Future for ReadChunk<'a> {
    type Output = Result<Bytes, Error>;

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sink.poll_read(cx, self.max)
    }
}

impl BodySink {
    pub fn read_chunk(&self, max: usize) -> ReadChunk<'_> {
        ReadChunk { sink: self, max }
    }
}
