use std::path::PathBuf;
use std::sync::Arc;

use mime_guess::mime::{self, Mime};
use tokio::fs::File;
use tracing::{debug, warn};

use crate::{KnownSize, RangeBody, Song, SongLookup, StreamError};

/// Used when a song neither declares a type nor has a recognisable extension.
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// An opened song, ready to be served.
#[derive(Debug)]
pub struct ResolvedResource {
    pub id: String,
    pub body: KnownSize<File>,
    pub content_type: Mime,
}

/// Maps song ids to opened media files under a root directory.
#[derive(Clone)]
pub struct Resolver {
    media_root: PathBuf,
    songs: Arc<dyn SongLookup>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("media_root", &self.media_root)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(media_root: impl Into<PathBuf>, songs: Arc<dyn SongLookup>) -> Self {
        Resolver { media_root: media_root.into(), songs }
    }

    /// Looks the song up and opens its file. An unknown id is
    /// [`StreamError::NotFound`]; a known song whose file cannot be opened or
    /// measured is [`StreamError::ResourceUnavailable`].
    pub async fn resolve(&self, id: &str) -> Result<ResolvedResource, StreamError> {
        let song = self.songs.find(id).ok_or_else(|| {
            debug!(id, "unknown song");
            StreamError::NotFound { id: id.to_string() }
        })?;

        let path = self.media_root.join(&song.file_path);
        let body = match KnownSize::open(&path).await {
            Ok(body) => body,
            Err(source) => {
                warn!(id, path = %path.display(), error = %source, "failed to open song");
                return Err(StreamError::ResourceUnavailable { id: id.to_string(), path, source });
            }
        };

        let content_type = content_type_for(&song);
        debug!(id, byte_size = body.byte_size(), %content_type, "resolved song");

        Ok(ResolvedResource { id: song.id, body, content_type })
    }
}

fn content_type_for(song: &Song) -> Mime {
    song.content_type
        .as_deref()
        .and_then(|declared| declared.parse().ok())
        .or_else(|| mime_guess::from_path(&song.file_path).first())
        .or_else(|| DEFAULT_CONTENT_TYPE.parse().ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
