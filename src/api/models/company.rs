//! Company documents, reminders, prices, and insight API shapes.

use crate::db::models::{CompanyDocumentUpsert, ReminderCreate, Severity};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CompanyDocumentRequest {
    pub title: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    pub file_path: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub company_key: Option<String>,
    pub notes: Option<String>,
}

fn default_doc_type() -> String {
    "other".to_string()
}

impl From<CompanyDocumentRequest> for CompanyDocumentUpsert {
    fn from(request: CompanyDocumentRequest) -> Self {
        Self {
            title: request.title,
            doc_type: request.doc_type,
            file_path: request.file_path,
            issue_date: request.issue_date,
            expiry_date: request.expiry_date,
            company_key: request.company_key,
            notes: request.notes,
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ExpiryQuery {
    /// Horizon in days; documents expiring within it are returned
    #[serde(default = "default_expiry_days")]
    pub days: i64,
}

fn default_expiry_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReminderRequest {
    pub title: String,
    pub body: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub severity: Option<Severity>,
}

impl From<ReminderRequest> for ReminderCreate {
    fn from(request: ReminderRequest) -> Self {
        Self {
            title: request.title,
            body: request.body,
            due_date: request.due_date,
            severity: request.severity,
            linked_entity_type: None,
            linked_entity_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReminderUpdateRequest {
    pub is_done: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct InsightQuery {
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
    #[serde(default)]
    pub auto_create: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ReminderListQuery {
    #[serde(default)]
    pub include_done: bool,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_reminder_limit")]
    pub limit: i64,
}

fn default_reminder_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PriceHistoryQuery {
    /// Item name; normalized before matching
    pub item: Option<String>,
    pub seller: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_price_limit")]
    pub limit: i64,
}

fn default_price_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PriceStatsQuery {
    /// Item name; normalized before matching
    pub item: String,
    pub seller: Option<String>,
    pub currency: Option<String>,
}
