//! Structured logging and tracing configuration.
//!
//! Log lines are either human readable, optionally colored, or JSON. The
//! default level comes from the command line and is overridden by
//! `RUST_LOG`.

use tracing::{info_span, Span};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Tracing configuration options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
    /// Colorize human readable output
    pub color: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            color: true,
        }
    }
}

impl From<&crate::ServerConfig> for TracingConfig {
    fn from(config: &crate::ServerConfig) -> Self {
        Self {
            level: config.log_level.to_lowercase(),
            json: config.log_json,
            color: config.color,
        }
    }
}

/// Initialize tracing with the given configuration.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_ansi(config.color);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!(
        "Tracing initialized: level={}, json={}, color={}",
        config.level,
        config.json,
        config.color
    );
}

/// Span for one HTTP request.
#[must_use]
pub fn request_span(method: &str, uri: &str) -> Span {
    info_span!("http_request", method = %method, uri = %uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
        assert!(config.color);
    }

    #[test]
    fn test_tracing_config_from_server_config() {
        let server = crate::ServerConfig {
            log_level: "DEBUG".to_string(),
            log_json: true,
            color: false,
            ..Default::default()
        };
        let config = TracingConfig::from(&server);
        assert_eq!(config.level, "debug");
        assert!(config.json);
        assert!(!config.color);
    }

    #[test]
    fn test_request_span() {
        let span = request_span("GET", "/api/v1/tree");
        let _guard = span.enter();
    }
}
