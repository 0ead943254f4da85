//! Serves the frontend bundle, if one is configured.

use std::path::Path;

use axum::routing::get;
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

const BANNER: &str = "dsk is running; no frontend has been configured.\n";

/// Router for everything outside the API. Unknown paths fall back to
/// `index.html` so client side routing works.
pub fn create_frontend_router(dir: Option<&Path>) -> Router {
    match dir {
        Some(dir) => {
            tracing::info!(frontend = %dir.display(), "Serving frontend");
            let index = ServeFile::new(dir.join("index.html"));
            Router::new().fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => Router::new().route("/", get(|| async { BANNER })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_banner_without_frontend() {
        let (status, body) = get_body(create_frontend_router(None), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, BANNER);
    }

    #[tokio::test]
    async fn test_serves_bundle_with_index_fallback() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(tmp.path().join("app.js"), "run()").unwrap();

        let (_, body) = get_body(create_frontend_router(Some(tmp.path())), "/app.js").await;
        assert_eq!(body, "run()");

        let (status, body) =
            get_body(create_frontend_router(Some(tmp.path())), "/Colors/Brand").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>app</html>");
    }
}
