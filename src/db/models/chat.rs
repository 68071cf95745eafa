//! Chat sessions, messages, and memory facts.

use crate::types::{RowId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    SearchQuery,
    SearchResult,
    DocumentRef,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FactType {
    UserPreference,
    DocumentContext,
    Entity,
    Relationship,
    Temporal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: String,
    pub status: SessionStatus,
    /// JSON arrays stored as text
    pub active_document_ids: String,
    pub active_invoice_ids: String,
    pub summary: Option<String>,
    pub summary_message_count: i64,
    pub total_tokens: i64,
    pub max_context_tokens: i64,
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MessageRecord {
    pub id: RowId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    pub message_type: MessageType,
    pub context_used: Option<String>,
    pub sources_json: Option<String>,
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MemoryFactRecord {
    pub id: RowId,
    pub session_id: Option<SessionId>,
    pub fact_type: FactType,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemoryFactUpsert {
    pub session_id: Option<SessionId>,
    pub fact_type: FactType,
    pub key: String,
    pub value: String,
    pub confidence: f64,
}
