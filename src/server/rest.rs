//! REST API endpoints.
//!
//! Versions 1 and 2 of the API share most endpoints; they differ in
//! search and in the prefix links inside documents point to.

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::error::ApiError;
use super::messages::messages_handler;
use super::metrics::{self, HTTP_DURATION, HTTP_REQUESTS};
use super::types::{V1Hello, V1Node, V1NodeTree, V1SearchResults};
use super::v2;
use crate::ddt::{alternate_names, Node, Tree};
use crate::pathutil::check_safe_path;
use crate::plex::{App, Source};

/// Which API a router serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::V1 => "/api/v1",
            Self::V2 => "/api/v2",
        }
    }

    /// Prefix of node URLs inside rendered documents.
    #[must_use]
    pub const fn tree_prefix(self) -> &'static str {
        match self {
            Self::V1 => "/api/v1/tree",
            Self::V2 => "/api/v2/tree",
        }
    }
}

/// State shared by the handlers of one API version.
#[derive(Clone)]
pub struct ApiState {
    pub app: Arc<App>,
    pub api: ApiVersion,
}

impl ApiState {
    /// Source selected by `?v=`; the primary source when empty.
    pub(super) fn source(&self, name: &str) -> Result<Arc<Source>, ApiError> {
        self.app
            .sources()
            .must_get(name)
            .map_err(|_| ApiError::UnknownSource(name.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub v: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub v: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sources: Vec<String>,
}

/// Create the REST router: health, metrics and both API versions.
pub fn create_rest_router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::clone(&app))
        .nest(
            ApiVersion::V1.prefix(),
            api_router(ApiState {
                app: Arc::clone(&app),
                api: ApiVersion::V1,
            }),
        )
        .nest(
            ApiVersion::V2.prefix(),
            api_router(ApiState {
                app,
                api: ApiVersion::V2,
            }),
        )
        .route_layer(middleware::from_fn(track_metrics))
}

fn api_router(state: ApiState) -> Router {
    let router = Router::new()
        .route("/hello", get(hello))
        .route("/config", get(config))
        .route("/sources", get(sources))
        .route("/tree", get(tree))
        .route("/tree/{*path}", get(node_or_asset))
        .route("/messages", get(messages_handler));

    let router = match state.api {
        ApiVersion::V1 => router.route("/search", get(legacy_search)),
        ApiVersion::V2 => router
            .route("/filter", get(v2::filter))
            .route("/search", get(v2::search)),
    };
    router.fallback(not_found).with_state(state)
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    HTTP_DURATION
        .with_label_values(&[method.as_str(), endpoint.as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}

/// Health check endpoint.
async fn health_check(State(app): State<Arc<App>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources: app.sources().names(),
    };
    tracing::debug!(sources = response.sources.len(), "Health check");
    Json(response)
}

/// Prometheus metrics endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        metrics::render(),
    )
}

/// Says hello :)
async fn hello(State(state): State<ApiState>) -> Json<V1Hello> {
    let config = state.app.config().data();
    Json(V1Hello {
        hello: "dsk".to_string(),
        org: config.org.clone(),
        project: config.project.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn config(
    State(state): State<ApiState>,
    Query(query): Query<SourceQuery>,
) -> Result<Response, ApiError> {
    let source = state.source(&query.v)?;
    let config = source.config()?.data();
    Ok(Json(config.as_ref()).into_response())
}

async fn sources(State(state): State<ApiState>) -> Response {
    Json(state.app.sources().statuses()).into_response()
}

fn etag(hash: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{hash}\"")).unwrap_or_else(|_| HeaderValue::from_static("\"\""))
}

/// Whether the client already has the representation with `hash`.
fn is_cached(headers: &HeaderMap, hash: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .map(|t| t.trim().trim_start_matches("W/").trim_matches('"'))
                .any(|t| t == hash)
        })
}

fn not_modified(hash: &str) -> Response {
    (StatusCode::NOT_MODIFIED, [(header::ETAG, etag(hash))]).into_response()
}

/// All nodes of the tree, nested.
async fn tree(
    State(state): State<ApiState>,
    Query(query): Query<SourceQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let source = state.source(&query.v)?;
    let tree = source.tree()?;

    let hash = tree.calculate_hash().await?;
    if is_cached(&headers, &hash) {
        return Ok(not_modified(&hash));
    }
    let record = V1NodeTree::build(&tree)?;
    Ok(([(header::ETAG, etag(&hash))], Json(record)).into_response())
}

/// A node, i.e. `/tree/DisplayData/Table`, or one of its assets, i.e.
/// `/tree/DisplayData/Table/foo.png`.
async fn node_or_asset(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    Query(query): Query<SourceQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let source = state.source(&query.v)?;
    let tree = source.tree()?;
    check_safe_path(FsPath::new(&path), tree.path())?;

    if has_extension(&path) {
        return asset_response(&tree, &path, request).await;
    }
    let node = tree.get(&path).ok_or(ApiError::NoSuchNode)?;
    node_response(&state, &source, &tree, &node, request.headers()).await
}

/// Whether the last path segment carries a file extension, which is what
/// tells assets apart from nodes.
fn has_extension(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|segment| segment.contains('.'))
}

async fn node_response(
    state: &ApiState,
    source: &Source,
    tree: &Tree,
    node: &Node,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let hash = node.calculate_hash()?;
    if is_cached(headers, &hash) {
        return Ok(not_modified(&hash));
    }
    let record = V1Node::build(node, tree, state.api.tree_prefix(), source.name()).await?;
    Ok(([(header::ETAG, etag(&hash))], Json(record)).into_response())
}

async fn asset_response(tree: &Tree, path: &str, request: Request) -> Result<Response, ApiError> {
    let (dir, base) = path.rsplit_once('/').unwrap_or(("", path));
    let node = tree.get(dir).ok_or(ApiError::NoSuchNode)?;

    if let Some(asset) = node.asset(base)? {
        return Ok(serve_file(&asset.path, request).await);
    }

    for alternate in alternate_names(base) {
        let Some(asset) = node.asset(&alternate)? else {
            continue;
        };
        tracing::debug!(asset = %alternate, requested = %base, "Serving converted asset");
        let content = asset.convert_to(base)?;
        let content_type = if base.to_lowercase().ends_with(".json") {
            "application/json"
        } else {
            "application/yaml"
        };
        return Ok(([(header::CONTENT_TYPE, content_type)], content).into_response());
    }
    Err(ApiError::NoSuchAsset)
}

async fn serve_file(path: &FsPath, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Substring search over titles, tags and keywords.
async fn legacy_search(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<V1SearchResults>, ApiError> {
    let source = state.source(&query.v)?;
    let results = source.search()?.legacy_filter_search(&query.q);
    Ok(Json(results.into()))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
