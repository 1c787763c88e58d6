//! HTTP surface: one streaming route, mounted at two paths.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::{Ranged, Resolver, StreamError};

/// Shared, read-only router state.
#[derive(Debug, Clone)]
pub struct AppState {
    resolver: Arc<Resolver>,
    stream_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(resolver: Resolver) -> Self {
        AppState { resolver: Arc::new(resolver), stream_timeout: None }
    }

    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/{id}", get(stream_song))
        .route("/api/songs/stream/{id}", get(stream_song))
        .layer(cors())
        .with_state(state)
}

/// Lets players on any origin send `Range` and read the range headers back.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers([header::RANGE])
        .expose_headers([header::CONTENT_RANGE, header::ACCEPT_RANGES, header::CONTENT_LENGTH])
}

/// `GET /stream/{id}`: the whole song, or the window named by `Range`.
#[tracing::instrument(skip(state, headers))]
pub async fn stream_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let resource = state.resolver.resolve(&id).await?;

    let mut ranged = Ranged::from_headers(&headers, resource.body, resource.content_type);
    if let Some(timeout) = state.stream_timeout {
        ranged = ranged.with_timeout(timeout);
    }

    Ok(ranged.into_response())
}

/// Serve until [`shutdown_signal`] resolves.
pub async fn serve(listener: TcpListener, state: AppState) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Completes on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => {
            warn!(error = %e, "failed to listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
