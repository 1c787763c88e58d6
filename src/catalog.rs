//! Song records and the lookup seam the resolver depends on.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use mime_guess::mime::Mime;
use serde::{Deserialize, Serialize};

/// A song as known to the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /// Length in seconds.
    #[serde(default)]
    pub duration: u32,
    /// Location of the media file, relative to the media root.
    #[serde(alias = "filePath")]
    pub file_path: PathBuf,
    /// Declared MIME type. Guessed from the file extension when absent.
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
}

/// Finds songs by id. Implemented by whatever owns the song collection.
pub trait SongLookup: Send + Sync {
    fn find(&self, id: &str) -> Option<Song>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate song id `{0}`")]
    DuplicateId(String),
    #[error("song `{id}` has a file path outside the media root: {}", path.display())]
    UnsafePath { id: String, path: PathBuf },
    #[error("song `{id}` declares an invalid content type `{value}`")]
    InvalidContentType { id: String, value: String },
}

/// In-memory [`SongLookup`], keyed by song id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    songs: HashMap<String, Song>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    songs: Vec<Song>,
}

impl Catalog {
    /// Build a catalog, validating every entry.
    pub fn new(songs: impl IntoIterator<Item = Song>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::new();
        for song in songs {
            validate(&song)?;
            if by_id.contains_key(&song.id) {
                return Err(CatalogError::DuplicateId(song.id));
            }
            by_id.insert(song.id.clone(), song);
        }
        Ok(Catalog { songs: by_id })
    }

    /// Parse a catalog from TOML holding a `[[songs]]` array.
    pub fn from_toml_str(s: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(s)?;
        Catalog::new(file.songs)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| CatalogError::Io { path: path.to_path_buf(), source })?;
        Catalog::from_toml_str(&content)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

impl SongLookup for Catalog {
    fn find(&self, id: &str) -> Option<Song> {
        self.songs.get(id).cloned()
    }
}

// Only plain relative paths may be joined onto the media root.
fn validate(song: &Song) -> Result<(), CatalogError> {
    let escapes = song.file_path.as_os_str().is_empty()
        || song.file_path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CatalogError::UnsafePath { id: song.id.clone(), path: song.file_path.clone() });
    }

    if let Some(value) = &song.content_type {
        if value.parse::<Mime>().is_err() {
            return Err(CatalogError::InvalidContentType { id: song.id.clone(), value: value.clone() });
        }
    }

    Ok(())
}
