use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures that stop a stream before any range logic runs.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("no song with id `{id}`")]
    NotFound { id: String },

    #[error("song `{id}` is unavailable at {}: {source}", path.display())]
    ResourceUnavailable {
        id: String,
        path: PathBuf,
        source: io::Error,
    },
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            StreamError::NotFound { .. } => (StatusCode::NOT_FOUND, "Song not found"),
            StreamError::ResourceUnavailable { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Song unavailable")
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = StreamError::NotFound { id: "9".into() };
        assert_eq!(StatusCode::NOT_FOUND, not_found.into_response().status());

        let unavailable = StreamError::ResourceUnavailable {
            id: "1".into(),
            path: "assets/a.mp3".into(),
            source: io::ErrorKind::PermissionDenied.into(),
        };
        assert_eq!(
            "song `1` is unavailable at assets/a.mp3: permission denied",
            unavailable.to_string()
        );
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, unavailable.into_response().status());
    }
}
