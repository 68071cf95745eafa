//! Database repository for company documents.

use crate::db::errors::Result;
use crate::db::models::{CompanyDocumentRecord, CompanyDocumentUpsert};
use crate::types::CompanyDocumentId;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub struct CompanyDocuments;

impl CompanyDocuments {
    #[instrument(skip(pool, request), fields(title = %request.title), err)]
    pub async fn create(pool: &SqlitePool, request: &CompanyDocumentUpsert) -> Result<CompanyDocumentRecord> {
        let id = Uuid::new_v4();
        let record = sqlx::query_as::<_, CompanyDocumentRecord>(
            r#"
            INSERT INTO company_documents
                (id, title, doc_type, file_path, issue_date, expiry_date, company_key, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.doc_type)
        .bind(&request.file_path)
        .bind(request.issue_date)
        .bind(request.expiry_date)
        .bind(&request.company_key)
        .bind(&request.notes)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn get(pool: &SqlitePool, id: CompanyDocumentId) -> Result<Option<CompanyDocumentRecord>> {
        let record = sqlx::query_as::<_, CompanyDocumentRecord>(
            "SELECT * FROM company_documents WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: CompanyDocumentId,
        request: &CompanyDocumentUpsert,
    ) -> Result<Option<CompanyDocumentRecord>> {
        let record = sqlx::query_as::<_, CompanyDocumentRecord>(
            r#"
            UPDATE company_documents
            SET title = ?2, doc_type = ?3, file_path = ?4, issue_date = ?5,
                expiry_date = ?6, company_key = ?7, notes = ?8, updated_at = ?9
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.doc_type)
        .bind(&request.file_path)
        .bind(request.issue_date)
        .bind(request.expiry_date)
        .bind(&request.company_key)
        .bind(&request.notes)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }

    pub async fn delete(pool: &SqlitePool, id: CompanyDocumentId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM company_documents WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<CompanyDocumentRecord>> {
        let limit = if limit > 0 { limit } else { 100 };
        let records = sqlx::query_as::<_, CompanyDocumentRecord>(
            "SELECT * FROM company_documents ORDER BY expiry_date IS NULL, expiry_date LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Documents expiring on or before the horizon date.
    pub async fn expiring(pool: &SqlitePool, horizon: NaiveDate) -> Result<Vec<CompanyDocumentRecord>> {
        let records = sqlx::query_as::<_, CompanyDocumentRecord>(
            "SELECT * FROM company_documents WHERE expiry_date IS NOT NULL AND expiry_date <= ?1 ORDER BY expiry_date",
        )
        .bind(horizon)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }
}
