//! Server configuration, read from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! server on port 8080 serving `assets/` with the catalog in `songs.toml`.
//! Relative paths are resolved against the working directory.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// Directory song file paths are relative to.
    pub media_root: PathBuf,
    /// TOML file holding the `[[songs]]` catalog.
    pub catalog: PathBuf,
    /// Abort any single stream that has not finished after this many seconds.
    pub stream_timeout_secs: Option<u64>,
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            media_root: PathBuf::from("assets"),
            catalog: PathBuf::from("songs.toml"),
            stream_timeout_secs: None,
            log_level: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(ServerConfig::default(), config);
        assert_eq!(8080, config.listen.port());
        assert_eq!(None, config.stream_timeout());
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::from_toml_str(
            r#"
            listen = "127.0.0.1:9000"
            media_root = "/srv/music"
            catalog = "/etc/audio-range/songs.toml"
            stream_timeout_secs = 600
            log_level = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(SocketAddr::from(([127, 0, 0, 1], 9000)), config.listen);
        assert_eq!(PathBuf::from("/srv/music"), config.media_root);
        assert_eq!(Some(Duration::from_secs(600)), config.stream_timeout());
        assert_eq!(Some("warn"), config.log_level.as_deref());
    }

    #[test]
    fn test_demo_config() {
        let config = ServerConfig::from_toml_str(include_str!("../demos/audio-range.toml")).unwrap();
        assert_eq!(PathBuf::from("demos/songs.toml"), config.catalog);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert_matches!(
            ServerConfig::from_toml_str("chunk_size = 4"),
            Err(ConfigError::Parse(_))
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            ServerConfig::from_file(&dir.path().join("audio-range.toml")),
            Err(ConfigError::Io { .. })
        );
    }
}
