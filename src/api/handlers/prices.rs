//! Price history and stats endpoints, reading the append-only ledger.

use crate::AppState;
use crate::api::models::{PriceHistoryQuery, PriceStatsQuery};
use crate::catalog::normalize;
use crate::db::handlers::PriceHistory;
use crate::db::handlers::price_history::PriceHistoryFilter;
use crate::db::models::PriceStats;
use crate::db::models::catalog::PriceHistoryRecord;
use crate::errors::Error;
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(get, path = "/api/prices/history", tag = "prices", params(PriceHistoryQuery),
    responses((status = 200, description = "Price observations, newest first", body = Vec<PriceHistoryRecord>)))]
pub async fn price_history(
    State(state): State<AppState>,
    Query(query): Query<PriceHistoryQuery>,
) -> Result<Json<Vec<PriceHistoryRecord>>, Error> {
    let filter = PriceHistoryFilter {
        normalized_name: query.item.as_deref().map(normalize),
        seller: query.seller,
        currency: query.currency,
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(PriceHistory::list(&state.pool, &filter).await?))
}

#[utoipa::path(get, path = "/api/prices/stats", tag = "prices", params(PriceStatsQuery),
    responses(
        (status = 200, description = "Aggregate stats for the item", body = PriceStats),
        (status = 404, description = "No observations for the item"),
    ))]
pub async fn price_stats(
    State(state): State<AppState>,
    Query(query): Query<PriceStatsQuery>,
) -> Result<Json<PriceStats>, Error> {
    let normalized = normalize(&query.item);
    let stats = PriceHistory::stats_with_fallback(
        &state.pool,
        &normalized,
        query.seller.as_deref(),
        query.currency.as_deref(),
        None,
    )
    .await?
    .ok_or(Error::Validation {
        message: format!("no price observations for \"{normalized}\""),
    })?;
    Ok(Json(stats))
}
