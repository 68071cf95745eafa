//! Materials catalog, synonyms, and the price history ledger.

use crate::types::{InvoiceId, MaterialId, RowId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OriginConfidence {
    Confirmed,
    Likely,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaterialRecord {
    pub id: MaterialId,
    pub display_name: String,
    pub normalized_name: String,
    pub hs_code: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub origin_country: Option<String>,
    pub origin_confidence: OriginConfidence,
    pub source_url: Option<String>,
    pub evidence_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialCreate {
    pub display_name: String,
    pub hs_code: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub origin_country: Option<String>,
    pub source_url: Option<String>,
    pub evidence_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SynonymRecord {
    pub id: RowId,
    pub material_id: MaterialId,
    pub synonym: String,
}

/// Append-only price observation; only `material_id` is ever set after
/// insert, by the catalog reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PriceHistoryRecord {
    pub id: RowId,
    pub normalized_name: String,
    pub hs_code: Option<String>,
    pub seller: Option<String>,
    pub invoice_id: Option<InvoiceId>,
    pub invoice_date: Option<NaiveDate>,
    pub quantity: f64,
    pub unit_price: f64,
    pub currency: Option<String>,
    pub material_id: Option<MaterialId>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics behind the price-anomaly audit rule and the stats
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PriceStats {
    pub occurrence_count: i64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub last_seen: Option<NaiveDate>,
}
