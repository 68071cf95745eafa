//! Database repository for audit results.

use crate::db::errors::Result;
use crate::db::models::{AuditCreate, AuditRecord};
use crate::types::{AuditId, InvoiceId};
use sqlx::SqlitePool;
use tracing::instrument;

pub struct Audits;

impl Audits {
    #[instrument(skip(pool, request), fields(invoice_id = %request.invoice_id), err)]
    pub async fn insert(pool: &SqlitePool, request: &AuditCreate) -> Result<AuditRecord> {
        let record = sqlx::query_as::<_, AuditRecord>(
            r#"
            INSERT INTO audit_results
                (id, invoice_id, overall_status, success, audit_type, sections,
                 issues, processing_time_ms, model_identifier, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.invoice_id)
        .bind(request.overall_status)
        .bind(request.success)
        .bind(request.audit_type)
        .bind(request.sections.to_string())
        .bind(request.issues.to_string())
        .bind(request.processing_time_ms)
        .bind(&request.model_identifier)
        .bind(request.confidence)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn get(pool: &SqlitePool, id: AuditId) -> Result<Option<AuditRecord>> {
        let record = sqlx::query_as::<_, AuditRecord>("SELECT * FROM audit_results WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(record)
    }

    pub async fn list_for_invoice(pool: &SqlitePool, invoice_id: InvoiceId) -> Result<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_results WHERE invoice_id = ?1 ORDER BY created_at DESC",
        )
        .bind(invoice_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }
}
