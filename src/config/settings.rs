//! Process configuration and validation.

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration for the dsk server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root directory of the design definitions tree.
    pub root: PathBuf,

    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Directory with a frontend bundle to serve at `/`.
    pub frontend: Option<PathBuf>,

    /// Origins allowed by CORS; empty disables CORS, `*` allows any.
    pub allow_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Colorize human readable logs.
    pub color: bool,

    /// Debounce window for filesystem events.
    pub debounce: Duration,

    /// How often the repository HEAD is polled.
    pub repo_poll_interval: Duration,

    /// Persist search indexes below this directory instead of in memory.
    pub search_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: "127.0.0.1".to_string(),
            port: 8080,
            frontend: None,
            allow_origins: Vec::new(),
            log_level: "info".to_string(),
            log_json: false,
            color: true,
            debounce: crate::watcher::DEBOUNCE_DURATION,
            repo_poll_interval: crate::vcs::POLL_INTERVAL,
            search_dir: None,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port cannot be 0"));
        }

        if self.host.is_empty() {
            return Err(Error::config("host cannot be empty"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if !self.root.is_dir() {
            return Err(Error::config(format!(
                "tree root '{}' is not a directory",
                self.root.display()
            )));
        }

        if let Some(frontend) = &self.frontend {
            if !frontend.is_dir() {
                return Err(Error::config(format!(
                    "frontend '{}' is not a directory",
                    frontend.display()
                )));
            }
        }

        if self.debounce > Duration::from_secs(10) {
            return Err(Error::config("debounce cannot exceed 10s"));
        }

        if self.repo_poll_interval.is_zero() {
            return Err(Error::config("repo_poll_interval cannot be 0"));
        }

        Ok(())
    }

    /// Get the server address as a string.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
