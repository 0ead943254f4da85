//! Search endpoints of API version 2.

use axum::extract::{Query, State};
use axum::Json;

use super::error::ApiError;
use super::rest::{ApiState, SearchQuery};
use super::types::{V2FilterResults, V2FullSearchResults};

/// Narrow prefix search, for "search as you type" filtering of the
/// navigation.
pub async fn filter(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<V2FilterResults>, ApiError> {
    let source = state.source(&query.v)?;
    let results = source.search()?.filter_search(&query.q).await?;
    Ok(Json(results.into()))
}

/// Wide full-text search with highlighted fragments.
pub async fn search(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<V2FullSearchResults>, ApiError> {
    let source = state.source(&query.v)?;
    let results = source.search()?.full_search(&query.q).await?;
    tracing::debug!(q = %query.q, total = results.total, "Full search");
    Ok(Json(results.into()))
}
