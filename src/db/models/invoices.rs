//! Invoice and line-item entities.

use crate::types::{DocumentId, InvoiceId, MaterialId, RowId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ParsingStatus {
    Ok,
    Partial,
    Failed,
    NeedsReview,
}

/// Table rows emitted by parsers are not all merchandise: headers, summary
/// and subtotal rows flow through with their own type and are excluded from
/// price history and catalog matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RowType {
    LineItem,
    Header,
    Summary,
    Subtotal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub document_id: Option<DocumentId>,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub seller_name: Option<String>,
    pub buyer_name: Option<String>,
    pub company_key: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub discount: Option<f64>,
    pub total_amount: Option<f64>,
    pub quality_score: f64,
    pub confidence: f64,
    pub parser_used: Option<String>,
    pub parsing_status: ParsingStatus,
    pub is_latest: bool,
    /// Bank details JSON (iban, swift, bank name, ...), stored as text
    pub bank_details: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRecord {
    pub fn bank_details_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.bank_details).unwrap_or_else(|_| serde_json::json!({}))
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceCreate {
    pub document_id: Option<DocumentId>,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub seller_name: Option<String>,
    pub buyer_name: Option<String>,
    pub company_key: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub discount: Option<f64>,
    pub total_amount: Option<f64>,
    pub quality_score: f64,
    pub confidence: f64,
    pub parser_used: Option<String>,
    pub parsing_status: ParsingStatus,
    pub bank_details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LineItemRecord {
    pub id: RowId,
    pub invoice_id: InvoiceId,
    pub line_number: i64,
    pub item_name: String,
    pub description: Option<String>,
    pub hs_code: Option<String>,
    pub unit: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub row_type: RowType,
    pub matched_material_id: Option<MaterialId>,
}

#[derive(Debug, Clone)]
pub struct LineItemCreate {
    pub line_number: i64,
    pub item_name: String,
    pub description: Option<String>,
    pub hs_code: Option<String>,
    pub unit: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub row_type: RowType,
}

/// Filter for listing invoices
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub company_key: Option<String>,
    pub parsing_status: Option<ParsingStatus>,
    pub skip: i64,
    pub limit: i64,
}
