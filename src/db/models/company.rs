//! Company documents with expiry tracking, and reminders.

use crate::types::{CompanyDocumentId, ReminderId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CompanyDocumentRecord {
    pub id: CompanyDocumentId,
    pub title: String,
    pub doc_type: String,
    pub file_path: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub company_key: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyDocumentUpsert {
    pub title: String,
    pub doc_type: String,
    pub file_path: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub company_key: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReminderRecord {
    pub id: ReminderId,
    pub title: String,
    pub body: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub severity: Severity,
    pub is_done: bool,
    /// Prefixed namespace for derived reminders, e.g. `insight:expiring_doc`
    pub linked_entity_type: Option<String>,
    pub linked_entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderCreate {
    pub title: String,
    pub body: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub severity: Option<Severity>,
    pub linked_entity_type: Option<String>,
    pub linked_entity_id: Option<String>,
}
