//! Document, page, and chunk entities.

use crate::types::{DocumentId, RowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Ingestion lifecycle of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
}

/// Classified page kind; drives which pages the vision parser reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PageType {
    Invoice,
    PackingList,
    Contract,
    BankForm,
    Certificate,
    CoverLetter,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub file_path: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub version: i64,
    pub is_latest: bool,
    pub page_count: i64,
    pub company_key: Option<String>,
    /// Free-form JSON, stored as text
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub indexed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DocumentCreate {
    pub filename: String,
    pub file_path: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub company_key: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PageRecord {
    pub id: RowId,
    pub document_id: DocumentId,
    pub page_number: i64,
    pub page_type: PageType,
    pub type_confidence: f64,
    pub text: String,
    pub image_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageCreate {
    pub page_number: i64,
    pub page_type: PageType,
    pub type_confidence: f64,
    pub text: String,
    pub image_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ChunkRecord {
    pub id: RowId,
    pub document_id: DocumentId,
    pub page_id: Option<RowId>,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub char_start: i64,
    pub char_end: i64,
}
