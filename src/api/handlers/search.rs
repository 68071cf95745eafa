//! Search endpoints: hybrid, single-strategy flavors, and cache control.

use crate::AppState;
use crate::api::models::{QuickSearchQuery, SearchBody};
use crate::errors::Error;
use crate::search::cache::CacheStats;
use crate::search::{RankedResults, SearchRequest, SearchStrategy};
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(post, path = "/api/search", tag = "search", request_body = SearchBody,
    responses(
        (status = 200, description = "Ranked results", body = RankedResults),
        (status = 503, description = "Both retrieval sub-sources unavailable"),
    ))]
pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<RankedResults>, Error> {
    let request: SearchRequest = body.into();
    Ok(Json(state.retriever.search(&request).await?))
}

#[utoipa::path(get, path = "/api/search/quick", tag = "search", params(QuickSearchQuery),
    responses((status = 200, description = "Ranked results", body = RankedResults)))]
pub async fn quick_search(
    State(state): State<AppState>,
    Query(query): Query<QuickSearchQuery>,
) -> Result<Json<RankedResults>, Error> {
    let request = SearchRequest {
        query: query.q,
        top_k: query.k.clamp(1, 50),
        strategy: SearchStrategy::Hybrid,
        ..Default::default()
    };
    Ok(Json(state.retriever.search(&request).await?))
}

#[utoipa::path(post, path = "/api/search/semantic", tag = "search", request_body = SearchBody,
    responses((status = 200, description = "Vector-only results", body = RankedResults)))]
pub async fn search_semantic(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<RankedResults>, Error> {
    let request: SearchRequest = body.into();
    Ok(Json(state.retriever.search_semantic(&request).await?))
}

#[utoipa::path(post, path = "/api/search/keyword", tag = "search", request_body = SearchBody,
    responses((status = 200, description = "Lexical-only results", body = RankedResults)))]
pub async fn search_keyword(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<RankedResults>, Error> {
    let request: SearchRequest = body.into();
    Ok(Json(state.retriever.search_keyword(&request).await?))
}

#[utoipa::path(get, path = "/api/search/cache/stats", tag = "search",
    responses((status = 200, description = "Result cache counters", body = CacheStats)))]
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.retriever.cache_stats())
}

#[utoipa::path(post, path = "/api/search/cache/invalidate", tag = "search",
    responses((status = 200, description = "Cache cleared")))]
pub async fn cache_invalidate(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.retriever.cache_invalidate();
    Json(serde_json::json!({"invalidated": true}))
}
