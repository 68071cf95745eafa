//! Search API shapes.

use crate::search::{SearchFilters, SearchStrategy};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SearchBody {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub strategy: SearchStrategy,
    #[serde(default)]
    pub use_reranker: bool,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub min_score: f64,
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl From<SearchBody> for crate::search::SearchRequest {
    fn from(body: SearchBody) -> Self {
        Self {
            query: body.query,
            top_k: body.top_k.clamp(1, 100),
            strategy: body.strategy,
            use_reranker: body.use_reranker,
            use_cache: body.use_cache,
            filters: body.filters,
            min_score: body.min_score,
        }
    }
}

/// `GET /api/search/quick?q=...&k=5`
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct QuickSearchQuery {
    pub q: String,
    #[serde(default = "default_quick_k")]
    pub k: usize,
}

fn default_quick_k() -> usize {
    5
}
