use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use audio_range::{AppState, Catalog, Resolver, ServerConfig};

#[derive(Parser)]
#[command(name = "audio-range", about = "Stream audio files over HTTP with byte-range support")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Directory song file paths are relative to.
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// Song catalog file.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(media_root) = self.media_root {
            config.media_root = media_root;
        }
        if let Some(catalog) = self.catalog {
            config.catalog = catalog;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    let default_filter = config.log_level.as_deref().unwrap_or("info,audio_range=debug");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
                .context("invalid log filter")?,
        )
        .init();

    let catalog = Catalog::load(&config.catalog)
        .with_context(|| format!("loading catalog {}", config.catalog.display()))?;
    info!(songs = catalog.len(), media_root = %config.media_root.display(), "catalog loaded");

    let resolver = Resolver::new(config.media_root.clone(), Arc::new(catalog));
    let state = AppState::new(resolver).with_stream_timeout(config.stream_timeout());

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;

    audio_range::serve(listener, state).await?;
    Ok(())
}
