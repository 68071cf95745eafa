//! Invoice and document API shapes.

use crate::audit::AuditOutcome;
use crate::catalog::MatchSummary;
use crate::db::models::{
    AuditRecord, InvoiceRecord, LineItemRecord, MaterialRecord, ParsingStatus,
};
use crate::db::models::documents::DocumentRecord;
use crate::parser::ParseAttempt;
use crate::types::{MaterialId, RowId};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Options accepted alongside the multipart invoice upload. Every field is
/// an optional text part of the form.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UploadOptions {
    pub vendor_hint: Option<String>,
    pub template_id: Option<String>,
    pub company_key: Option<String>,
    pub auto_audit: Option<bool>,
    pub auto_index: Option<bool>,
    pub auto_catalog: Option<bool>,
    pub strict_mode: Option<bool>,
    pub allow_reversion: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub document: DocumentRecord,
    pub invoice: InvoiceRecord,
    pub items: Vec<LineItemRecord>,
    pub parse_attempts: Vec<ParseAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_summary: Option<MatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditOutcome>,
    pub indexed_chunks: usize,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct InvoiceListQuery {
    pub company_key: Option<String>,
    pub parsing_status: Option<ParsingStatus>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_invoice_limit")]
    pub limit: i64,
}

fn default_invoice_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceDetail {
    pub invoice: InvoiceRecord,
    pub items: Vec<LineItemRecord>,
    pub audits: Vec<AuditRecord>,
    /// Catalog suggestions for unmatched items: item id to candidates.
    pub suggestions: Vec<ItemSuggestions>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemSuggestions {
    pub item_id: RowId,
    pub materials: Vec<MaterialRecord>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuditRequest {
    #[serde(default)]
    pub use_llm: Option<bool>,
    #[serde(default)]
    pub strict_mode: Option<bool>,
    #[serde(default)]
    pub price_anomaly_threshold: Option<f64>,
    #[serde(default)]
    pub duplicate_window_days: Option<i64>,
    #[serde(default)]
    pub save_result: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MatchItemRequest {
    /// Material to link; null clears the link.
    pub material_id: Option<MaterialId>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCatalogRequest {
    #[schema(value_type = uuid::Uuid)]
    pub invoice_id: crate::types::InvoiceId,
    /// Restrict to these item ids; omitted means every line item.
    pub item_ids: Option<Vec<RowId>>,
}
