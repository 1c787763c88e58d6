//! # audio-range
//!
//! Byte-range audio streaming for [`axum`][1].
//!
//! A request for a song goes through three steps, none of which keep state
//! between requests:
//!
//! 1. [`Resolver`] looks the song up through a [`SongLookup`] and opens its
//!    file as a [`KnownSize`] handle.
//! 2. [`range::classify`] turns the optional `Range` header and the file
//!    length into a [`RangeOutcome`].
//! 3. [`Ranged`] emits `200`, `206` or `416` and streams the byte window in
//!    bounded chunks through [`RangedStream`].
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeekStart`] can be
//! served with the [`KnownSize`] adapter struct.
//!
//! ```
//! use axum::Router;
//! use axum::http::HeaderMap;
//! use axum::routing::get;
//! use axum::response::{IntoResponse, Response};
//!
//! use audio_range::{KnownSize, Ranged};
//!
//! async fn song(headers: HeaderMap) -> Response {
//!     match KnownSize::open("song.mp3").await {
//!         Ok(body) => Ranged::from_headers(&headers, body, "audio/mpeg".parse().unwrap()).into_response(),
//!         Err(_) => axum::http::StatusCode::NOT_FOUND.into_response(),
//!     }
//! }
//!
//! let _app = Router::<()>::new().route("/song", get(song));
//! ```
//!
//! [1]: https://docs.rs/axum

mod catalog;
mod config;
mod error;
mod file;
pub mod range;
mod resolve;
mod server;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::header::RANGE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ContentType};
use mime_guess::mime::Mime;
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::warn;

pub use catalog::{Catalog, CatalogError, Song, SongLookup};
pub use config::{ConfigError, ServerConfig};
pub use error::StreamError;
pub use file::KnownSize;
pub use range::{ByteRange, MalformedRange, RangeOutcome, Unsatisfiable};
pub use resolve::{ResolvedResource, Resolver, DEFAULT_CONTENT_TYPE};
pub use server::{router, serve, shutdown_signal, stream_song, AppState};
pub use stream::{RangedStream, IO_BUFFER_SIZE};

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying file.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Streams never send more than the window computed from this value.
    fn byte_size(&self) -> u64;
}

/// The main responder type. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    range: Option<HeaderValue>,
    body: B,
    content_type: Mime,
    timeout: Option<Duration>,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing [`RangeBody`]
    /// and the raw value of an optional `Range` header.
    pub fn new(range: Option<HeaderValue>, body: B, content_type: Mime) -> Self {
        Ranged { range, body, content_type, timeout: None }
    }

    /// Same as [`Ranged::new`], taking the `Range` header from a request's headers.
    pub fn from_headers(headers: &HeaderMap, body: B, content_type: Mime) -> Self {
        Ranged::new(headers.get(RANGE).cloned(), body, content_type)
    }

    /// Abort the body stream if it has not finished within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Decide how to answer without doing any I/O.
    pub fn outcome(&self) -> RangeOutcome {
        let header = self.range.as_ref().map(HeaderValue::as_bytes);
        range::classify_bytes(header, self.body.byte_size())
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`RangeNotSatisfiable`] error if requested
    /// range in header was not satisfiable.
    pub fn try_respond(self) -> Result<RangedResponse<B>, RangeNotSatisfiable> {
        let total_bytes = self.body.byte_size();
        let outcome = self.outcome();
        let Ranged { body, content_type, timeout, .. } = self;

        let stream = |start, length| {
            let stream = RangedStream::new(body, start, length);
            match timeout {
                Some(timeout) => stream.with_timeout(timeout),
                None => stream,
            }
        };

        match outcome {
            RangeOutcome::FullBody => Ok(RangedResponse::Full {
                content_length: ContentLength(total_bytes),
                stream: stream(0, total_bytes),
                content_type,
            }),
            RangeOutcome::PartialBody(range) => {
                let content_range = content_range(range, total_bytes)?;
                Ok(RangedResponse::Partial {
                    content_range,
                    content_length: ContentLength(range.len()),
                    stream: stream(range.start, range.len()),
                    content_type,
                })
            }
            RangeOutcome::Unsatisfiable(reason) => {
                warn!(%reason, total_bytes, "range not satisfiable");
                Err(RangeNotSatisfiable::new(total_bytes, reason))
            }
        }
    }
}

fn content_range(range: ByteRange, total_bytes: u64) -> Result<ContentRange, RangeNotSatisfiable> {
    let reason = if range.start > range.end {
        Unsatisfiable::Inverted { start: range.start, end: range.end }
    } else {
        Unsatisfiable::StartBeyondLength { start: range.start, length: total_bytes }
    };

    if range.start > range.end || range.end >= total_bytes {
        return Err(RangeNotSatisfiable::new(total_bytes, reason));
    }
    ContentRange::bytes(range.start..=range.end, total_bytes)
        .map_err(|_| RangeNotSatisfiable::new(total_bytes, reason))
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone)]
pub struct RangeNotSatisfiable {
    pub content_range: ContentRange,
    pub reason: Unsatisfiable,
}

impl RangeNotSatisfiable {
    pub fn new(total_bytes: u64, reason: Unsatisfiable) -> Self {
        RangeNotSatisfiable { content_range: ContentRange::unsatisfied_bytes(total_bytes), reason }
    }
}

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.content_range);
        (status, header, ()).into_response()
    }
}

/// Data type containing computed headers and body for a range response. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum RangedResponse<B> {
    /// No range requested, the whole body with `200 OK`.
    Full {
        content_length: ContentLength,
        stream: RangedStream<B>,
        content_type: Mime,
    },
    /// One satisfiable range with `206 Partial Content`.
    Partial {
        content_range: ContentRange,
        content_length: ContentLength,
        stream: RangedStream<B>,
        content_type: Mime,
    },
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        let accept_ranges = TypedHeader(AcceptRanges::bytes());

        match self {
            RangedResponse::Full { content_length, stream, content_type } => (
                StatusCode::OK,
                accept_ranges,
                TypedHeader(content_length),
                TypedHeader(ContentType::from(content_type)),
                stream,
            )
                .into_response(),
            RangedResponse::Partial { content_range, content_length, stream, content_type } => (
                StatusCode::PARTIAL_CONTENT,
                accept_ranges,
                TypedHeader(content_range),
                TypedHeader(content_length),
                TypedHeader(ContentType::from(content_type)),
                stream,
            )
                .into_response(),
        }
    }
}
