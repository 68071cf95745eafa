//! Persisted audit results.

use crate::types::{AuditId, InvoiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pass,
    Hold,
    Fail,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
pub enum AuditType {
    #[serde(rename = "rules+model")]
    #[sqlx(rename = "rules+model")]
    RulesAndModel,
    #[serde(rename = "rules_only")]
    #[sqlx(rename = "rules_only")]
    RulesOnly,
    #[serde(rename = "fallback")]
    #[sqlx(rename = "fallback")]
    Fallback,
}

/// One row per audit invocation. Sections and issues are stored as JSON
/// text; the typed shapes live in the audit engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditRecord {
    pub id: AuditId,
    pub invoice_id: InvoiceId,
    pub overall_status: AuditStatus,
    pub success: bool,
    pub audit_type: AuditType,
    pub sections: String,
    pub issues: String,
    pub processing_time_ms: i64,
    pub model_identifier: Option<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuditCreate {
    pub id: AuditId,
    pub invoice_id: InvoiceId,
    pub overall_status: AuditStatus,
    pub success: bool,
    pub audit_type: AuditType,
    pub sections: serde_json::Value,
    pub issues: serde_json::Value,
    pub processing_time_ms: i64,
    pub model_identifier: Option<String>,
    pub confidence: f64,
}
