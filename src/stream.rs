use std::future::Future;
use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::{Response, IntoResponse};
use bytes::{Bytes, BytesMut};
use http_body::{Body, SizeHint, Frame};
use futures::Stream;
use pin_project::{pin_project, pinned_drop};
use tokio::io::ReadBuf;
use tokio::time::Sleep;
use tracing::{debug, warn};

use crate::RangeBody;

/// Upper bound on the size of a single chunk read from the body.
pub const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body stream over one byte window of a [`RangeBody`].
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// The next chunk is only read once the previous one has been taken, so at
/// most one buffer of [`IO_BUFFER_SIZE`] is held regardless of window size.
/// The stream ends after exactly `length` bytes even if the body holds more.
#[pin_project(PinnedDrop)]
pub struct RangedStream<B> {
    state: StreamState,
    length: u64,
    remaining: u64,
    deadline: Option<Pin<Box<Sleep>>>,
    #[pin]
    body: B,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64) -> Self {
        let state = if length == 0 {
            StreamState::Done
        } else {
            StreamState::Seek { start }
        };

        RangedStream {
            state,
            length,
            remaining: length,
            deadline: None,
            body,
        }
    }

    /// Fail the stream with [`io::ErrorKind::TimedOut`] once `timeout` has
    /// elapsed, counted from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Box::pin(tokio::time::sleep(timeout)));
        self
    }

    /// Bytes still to be sent.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<B> std::fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking,
    Reading { buffer: BytesMut },
    Done,
}

impl StreamState {
    // False before the first poll (HEAD drops the body unpolled) and after the end.
    fn in_flight(&self) -> bool {
        matches!(self, StreamState::Seeking | StreamState::Reading { .. })
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn is_end_stream(&self) -> bool {
        self.remaining == 0
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let Some(deadline) = this.deadline.as_mut() {
            if !matches!(this.state, StreamState::Done) && deadline.as_mut().poll(cx).is_ready() {
                warn!(remaining = *this.remaining, "stream deadline elapsed, aborting");
                return fail(this.state, io::Error::new(io::ErrorKind::TimedOut, "stream deadline elapsed"));
            }
        }

        loop {
            match this.state {
                StreamState::Seek { start } => {
                    match this.body.as_mut().start_seek(*start) {
                        Err(e) => return fail(this.state, e),
                        Ok(()) => *this.state = StreamState::Seeking,
                    }
                }

                StreamState::Seeking => {
                    match this.body.as_mut().poll_complete(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return fail(this.state, e),
                        Poll::Ready(Ok(())) => {
                            let buffer = allocate_buffer(*this.remaining);
                            *this.state = StreamState::Reading { buffer };
                        }
                    }
                }

                StreamState::Reading { buffer } => {
                    if *this.remaining == 0 {
                        *this.state = StreamState::Done;
                        return Poll::Ready(None);
                    }

                    let uninit = buffer.spare_capacity_mut();

                    // read no further than the end of the window
                    let nbytes = std::cmp::min(
                        uninit.len(),
                        usize::try_from(*this.remaining).unwrap_or(usize::MAX),
                    );

                    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                    match this.body.as_mut().poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return fail(this.state, e),
                        Poll::Ready(Ok(())) => {
                            match read_buf.filled().len() {
                                0 => {
                                    warn!(
                                        remaining = *this.remaining,
                                        "body ended before the requested window was sent"
                                    );
                                    return fail(this.state, io::ErrorKind::UnexpectedEof.into());
                                }
                                n => {
                                    // SAFETY: poll_read has filled the buffer with `n`
                                    // additional bytes. `buffer.len` should always be
                                    // 0 here, but include it for rigorous correctness
                                    unsafe { buffer.set_len(buffer.len() + n); }

                                    *this.remaining -= n as u64;

                                    let chunk = if *this.remaining == 0 {
                                        let chunk = mem::take(buffer);
                                        *this.state = StreamState::Done;
                                        chunk
                                    } else {
                                        let next = allocate_buffer(*this.remaining);
                                        mem::replace(buffer, next)
                                    };

                                    return Poll::Ready(Some(Ok(chunk.freeze())));
                                }
                            }
                        }
                    }
                }

                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

#[pinned_drop]
impl<B> PinnedDrop for RangedStream<B> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if this.state.in_flight() {
            // the transport dropped us early, usually a client disconnect
            debug!(
                delivered = *this.length - *this.remaining,
                remaining = *this.remaining,
                "stream aborted before completion"
            );
        }
    }
}

fn fail(state: &mut StreamState, err: io::Error) -> Poll<Option<io::Result<Bytes>>> {
    *state = StreamState::Done;
    Poll::Ready(Some(Err(err)))
}

fn allocate_buffer(remaining: u64) -> BytesMut {
    let capacity = usize::try_from(remaining).map_or(IO_BUFFER_SIZE, |r| r.min(IO_BUFFER_SIZE));
    BytesMut::with_capacity(capacity)
}
