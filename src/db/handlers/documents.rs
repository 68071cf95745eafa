//! Database repository for documents, pages, and chunks.

use crate::db::errors::Result;
use crate::db::models::{
    ChunkRecord, DocumentCreate, DocumentRecord, DocumentStatus, PageCreate, PageRecord,
};
use crate::types::{DocumentId, RowId};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub struct Documents;

impl Documents {
    /// Insert a new document. When an earlier version with the same content
    /// hash exists, its `is_latest` flag is cleared in the same transaction
    /// so the partial unique index stays satisfiable.
    #[instrument(skip(pool, request), fields(filename = %request.filename), err)]
    pub async fn create(pool: &SqlitePool, request: &DocumentCreate) -> Result<DocumentRecord> {
        let mut tx = pool.begin().await?;

        let prior_version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM documents WHERE content_hash = ?1 AND is_latest = 1",
        )
        .bind(&request.content_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if prior_version.is_some() {
            sqlx::query("UPDATE documents SET is_latest = 0, updated_at = ?2 WHERE content_hash = ?1 AND is_latest = 1")
                .bind(&request.content_hash)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        let id = Uuid::new_v4();
        let version = prior_version.unwrap_or(0) + 1;
        let document = sqlx::query_as::<_, DocumentRecord>(
            r#"
            INSERT INTO documents
                (id, filename, file_path, content_hash, size_bytes, mime_type,
                 status, version, is_latest, company_key, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, 1, ?8, ?9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.filename)
        .bind(&request.file_path)
        .bind(&request.content_hash)
        .bind(request.size_bytes)
        .bind(&request.mime_type)
        .bind(version)
        .bind(&request.company_key)
        .bind(request.metadata.to_string())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(document)
    }

    pub async fn get(pool: &SqlitePool, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let document = sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(document)
    }

    /// The latest version carrying the given content hash, if any.
    pub async fn get_latest_by_hash(pool: &SqlitePool, content_hash: &str) -> Result<Option<DocumentRecord>> {
        let document = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE content_hash = ?1 AND is_latest = 1",
        )
        .bind(content_hash)
        .fetch_optional(pool)
        .await?;
        Ok(document)
    }

    pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<DocumentRecord>> {
        let documents = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;
        Ok(documents)
    }

    #[instrument(skip(pool), err)]
    pub async fn set_status(
        pool: &SqlitePool,
        id: DocumentId,
        status: DocumentStatus,
    ) -> Result<()> {
        let indexed_at = matches!(status, DocumentStatus::Indexed).then(Utc::now);
        sqlx::query(
            "UPDATE documents SET status = ?2, indexed_at = COALESCE(?3, indexed_at), updated_at = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(status)
        .bind(indexed_at)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_page_count(pool: &SqlitePool, id: DocumentId, page_count: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET page_count = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(page_count)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a document. Pages, chunks, and vector-map rows cascade;
    /// invoices keep their history with a nulled document reference.
    #[instrument(skip(pool), err)]
    pub async fn delete(pool: &SqlitePool, id: DocumentId) -> Result<bool> {
        let mut tx = pool.begin().await?;
        let affected = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(affected > 0)
    }

    pub async fn insert_pages(
        pool: &SqlitePool,
        document_id: DocumentId,
        pages: &[PageCreate],
    ) -> Result<Vec<PageRecord>> {
        let mut tx = pool.begin().await?;
        let mut records = Vec::with_capacity(pages.len());
        for page in pages {
            let record = sqlx::query_as::<_, PageRecord>(
                r#"
                INSERT INTO pages (document_id, page_number, page_type, type_confidence, text, image_hash)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                RETURNING *
                "#,
            )
            .bind(document_id)
            .bind(page.page_number)
            .bind(page.page_type)
            .bind(page.type_confidence)
            .bind(&page.text)
            .bind(&page.image_hash)
            .fetch_one(&mut *tx)
            .await?;
            records.push(record);
        }
        tx.commit().await?;
        Ok(records)
    }

    pub async fn pages_for(pool: &SqlitePool, document_id: DocumentId) -> Result<Vec<PageRecord>> {
        let pages = sqlx::query_as::<_, PageRecord>(
            "SELECT * FROM pages WHERE document_id = ?1 ORDER BY page_number",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await?;
        Ok(pages)
    }

    /// Insert chunk rows for one page. The FTS mirror is maintained by
    /// triggers; vector entries are appended later by the indexer.
    pub async fn insert_chunks(
        conn: &mut SqliteConnection,
        document_id: DocumentId,
        page_id: Option<RowId>,
        chunks: &[(i64, String, i64, i64)],
    ) -> Result<Vec<RowId>> {
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk_index, text, char_start, char_end) in chunks {
            let id: RowId = sqlx::query_scalar(
                r#"
                INSERT INTO chunks (document_id, page_id, chunk_index, chunk_text, char_start, char_end)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                RETURNING id
                "#,
            )
            .bind(document_id)
            .bind(page_id)
            .bind(chunk_index)
            .bind(text)
            .bind(char_start)
            .bind(char_end)
            .fetch_one(&mut *conn)
            .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn chunks_for(pool: &SqlitePool, document_id: DocumentId) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE document_id = ?1 ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await?;
        Ok(chunks)
    }

    /// Chunks past the incremental cursor, oldest first.
    pub async fn chunks_after(pool: &SqlitePool, cursor: RowId, limit: i64) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE id > ?1 ORDER BY id LIMIT ?2",
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(chunks)
    }

    pub async fn delete_chunks_for(pool: &SqlitePool, document_id: DocumentId) -> Result<u64> {
        let affected = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn count_chunks(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_test;
    use serde_json::json;

    fn create_request(name: &str, hash: &str) -> DocumentCreate {
        DocumentCreate {
            filename: name.to_string(),
            file_path: format!("data/documents/{name}"),
            content_hash: hash.to_string(),
            size_bytes: 42,
            mime_type: "application/pdf".to_string(),
            company_key: None,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let pool = connect_test().await;
        let created = Documents::create(&pool, &create_request("a.pdf", "hash-a"))
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        assert!(created.is_latest);

        let fetched = Documents::get(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.filename, "a.pdf");
        assert_eq!(fetched.status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn reupload_same_hash_bumps_version_and_keeps_one_latest() {
        let pool = connect_test().await;
        let first = Documents::create(&pool, &create_request("a.pdf", "same"))
            .await
            .unwrap();
        let second = Documents::create(&pool, &create_request("a2.pdf", "same"))
            .await
            .unwrap();
        assert_eq!(second.version, 2);

        let old = Documents::get(&pool, first.id).await.unwrap().unwrap();
        assert!(!old.is_latest);

        let latest = Documents::get_latest_by_hash(&pool, "same").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn delete_cascades_pages_and_chunks() {
        let pool = connect_test().await;
        let doc = Documents::create(&pool, &create_request("b.pdf", "hash-b"))
            .await
            .unwrap();
        let pages = Documents::insert_pages(
            &pool,
            doc.id,
            &[PageCreate {
                page_number: 1,
                page_type: crate::db::models::PageType::Invoice,
                type_confidence: 0.9,
                text: "INVOICE NO 1".to_string(),
                image_hash: None,
            }],
        )
        .await
        .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        Documents::insert_chunks(
            &mut conn,
            doc.id,
            Some(pages[0].id),
            &[(0, "INVOICE NO 1".to_string(), 0, 12)],
        )
        .await
        .unwrap();
        drop(conn);

        assert!(Documents::delete(&pool, doc.id).await.unwrap());
        assert_eq!(Documents::count_chunks(&pool).await.unwrap(), 0);
        assert!(Documents::pages_for(&pool, doc.id).await.unwrap().is_empty());
    }
}
