//! HTTP server.
//!
//! Puts the API, health, metrics and frontend routers together and runs
//! them until a shutdown signal arrives, then closes the application.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::frontend::create_frontend_router;
use super::observability::request_span;
use super::rest::create_rest_router;
use crate::plex::App;
use crate::{Result, ServerConfig};

/// Serves one [`App`] over HTTP.
pub struct Server {
    config: ServerConfig,
    app: Arc<App>,
}

impl Server {
    #[must_use]
    pub fn new(config: ServerConfig, app: Arc<App>) -> Self {
        Self { config, app }
    }

    /// Build the router with all endpoints.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(create_rest_router(Arc::clone(&self.app)))
            .merge(create_frontend_router(self.config.frontend.as_deref()))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &axum::http::Request<_>| {
                        request_span(request.method().as_str(), &request.uri().to_string())
                    })
                    .on_response(
                        |response: &axum::response::Response,
                         latency: std::time::Duration,
                         _span: &tracing::Span| {
                            tracing::debug!(
                                status = %response.status(),
                                ?latency,
                                "Request completed"
                            );
                        },
                    ),
            );

        match cors_layer(&self.config.allow_origins) {
            Some(cors) => router.layer(cors),
            None => router,
        }
    }

    /// Run the server until shutdown signal, then close the application.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot start or encounters
    /// a fatal error during execution.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server_addr()
            .parse()
            .map_err(|e| crate::Error::config(format!("invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            crate::error::ServerError::BindFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!("Listening on http://{addr}");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error::ServerError::Request(e.to_string()));

        let closed = self.app.close().await;
        served?;
        closed?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// CORS for the given origins; `None` when no origin is allowed.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return Some(cors.allow_origin(Any));
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(cors.allow_origin(allowed))
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plex::SourceOptions;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn create_server(config: ServerConfig) -> (TempDir, Server) {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Colors")).unwrap();
        let app = App::open(tmp.path(), SourceOptions::default()).await.unwrap();
        (tmp, Server::new(config, Arc::new(app)))
    }

    #[test]
    fn test_cors_layer() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_some());
    }

    #[tokio::test]
    async fn test_router_serves_api_and_banner() {
        let (_tmp, server) = create_server(ServerConfig::default()).await;
        let router = server.router();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/api/v1/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_cors() {
        let config = ServerConfig {
            allow_origins: vec!["http://localhost:3000".to_string()],
            ..Default::default()
        };
        let (_tmp, server) = create_server(config).await;
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/hello")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }
}
