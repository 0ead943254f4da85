//! dsk - design definitions tree server
//!
//! Entry point for the dsk server.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dsk::plex::{App, SourceOptions};
use dsk::server::{init_metrics, init_tracing, Server, TracingConfig};
use dsk::{Error, Result, ServerConfig};

/// dsk - serves a design definitions tree
#[derive(Parser, Debug)]
#[command(name = "dsk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory of the tree; defaults to the directory of the
    /// executable
    #[arg(env = "DSK_DIR")]
    dir: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, env = "DSK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "DSK_PORT", default_value = "8080")]
    port: u16,

    /// Directory with a frontend bundle to serve
    #[arg(long, env = "DSK_FRONTEND")]
    frontend: Option<PathBuf>,

    /// Origin allowed to make cross-origin requests, may be repeated;
    /// use `*` to allow any
    #[arg(long = "allow-origin", env = "DSK_ALLOW_ORIGINS", value_delimiter = ',')]
    allow_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DSK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DSK_LOG_JSON")]
    log_json: bool,

    /// Disable colored log output
    #[arg(long, env = "DSK_NO_COLOR")]
    no_color: bool,

    /// Debounce window for filesystem events, in milliseconds
    #[arg(long, env = "DSK_DEBOUNCE_MS", default_value = "250")]
    debounce_ms: u64,

    /// How often the repository is polled for changes, in milliseconds
    #[arg(long, env = "DSK_REPO_POLL_MS", default_value = "2000")]
    repo_poll_ms: u64,

    /// Persist search indexes in this directory
    #[arg(long, env = "DSK_SEARCH_DIR")]
    search_dir: Option<PathBuf>,
}

fn default_root() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(std::path::Path::to_path_buf)
        .ok_or_else(|| Error::config("cannot determine directory of the executable"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig {
        root: match cli.dir {
            Some(dir) => dir,
            None => default_root()?,
        },
        host: cli.host,
        port: cli.port,
        frontend: cli.frontend,
        allow_origins: cli.allow_origins,
        log_level: cli.log_level,
        log_json: cli.log_json,
        color: !cli.no_color,
        debounce: Duration::from_millis(cli.debounce_ms),
        repo_poll_interval: Duration::from_millis(cli.repo_poll_ms),
        search_dir: cli.search_dir,
    };

    init_tracing(&TracingConfig::from(&config));

    tracing::info!("dsk v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;
    init_metrics();

    tracing::info!(root = %config.root.display(), "Opening tree");
    let app = Arc::new(App::open(&config.root, SourceOptions::from(&config)).await?);
    app.open_versions();

    Server::new(config, app).run().await
}
