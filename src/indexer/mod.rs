//! Indexer: chunks documents, embeds them, and keeps the lexical index,
//! vector index, and map table in parity.
//!
//! Parity invariant: every chunk row has exactly one FTS row (trigger
//! maintained), one vector entry, and one vector-map row. Incremental runs
//! persist progress cursors in the singleton `index_state` row and commit
//! map rows with the cursor advance; re-processing an interrupted batch is
//! absorbed by the map-row primary key on vector position.

use crate::config::{EmbeddingConfig, SearchConfig};
use crate::db::handlers::{Documents, Invoices};
use crate::db::models::documents::DocumentStatus;
use crate::db::models::{ChunkRecord, LineItemRecord};
use crate::errors::{Error, Result};
use crate::llm::ModelProvider;
use crate::search::vector::{SharedVectorIndex, VectorIndex};
use crate::types::{DocumentId, RowId};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

static IBAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").expect("iban regex"));
static SWIFT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?\b").expect("swift regex"));

/// Bank/payment vocabulary excluded from the line-item vector index, in the
/// two languages the corpus actually contains.
const BANK_KEYWORDS: &[&str] = &[
    "iban", "swift", "bic", "bank", "account no", "account number", "beneficiary", "branch",
    "routing", "sort code", "بنك", "مصرف", "حساب", "آيبان", "سويفت", "فرع", "المستفيد",
];

/// True for line-item text that belongs to payment plumbing, not
/// merchandise. Applied to item indexing only, never to chunks.
pub fn is_bank_info(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.len() < 3 {
        return true;
    }
    if IBAN_RE.is_match(trimmed) || SWIFT_RE.is_match(trimmed) {
        return true;
    }
    let lower = trimmed.to_lowercase();
    BANK_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// One chunk-to-be, with char offsets into the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub index: i64,
    pub text: String,
    pub char_start: i64,
    pub char_end: i64,
}

/// Token-window chunking. Windows of `chunk_size` whitespace tokens with
/// `chunk_overlap` tokens of overlap; chunks shorter than 3 characters are
/// dropped.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<ChunkPiece> {
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    // Token byte spans, so chunk text is a slice of the original.
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut start = None;
    for (offset, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, offset));
            }
        } else if start.is_none() {
            start = Some(offset);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    let mut pieces = Vec::new();
    let mut window_start = 0;
    let mut index = 0;
    while window_start < spans.len() {
        let window_end = (window_start + chunk_size).min(spans.len());
        let byte_start = spans[window_start].0;
        let byte_end = spans[window_end - 1].1;
        let chunk = &text[byte_start..byte_end];
        if chunk.chars().count() >= 3 {
            pieces.push(ChunkPiece {
                index,
                text: chunk.to_string(),
                char_start: text[..byte_start].chars().count() as i64,
                char_end: text[..byte_end].chars().count() as i64,
            });
            index += 1;
        }
        if window_end == spans.len() {
            break;
        }
        window_start += step;
    }
    pieces
}

/// Indexer progress, read from the singleton state row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct IndexState {
    pub last_chunk_id: i64,
    pub last_item_id: i64,
    pub is_building: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IndexStats {
    pub documents: i64,
    pub chunks: i64,
    pub chunk_vectors: usize,
    pub chunk_map_rows: i64,
    pub item_vectors: usize,
    pub item_map_rows: i64,
    pub parity_ok: bool,
    pub state: IndexState,
}

pub struct Indexer {
    pool: SqlitePool,
    provider: Arc<dyn ModelProvider>,
    chunks_index: Arc<SharedVectorIndex>,
    items_index: Arc<SharedVectorIndex>,
    search: SearchConfig,
    embedding: EmbeddingConfig,
}

impl Indexer {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn ModelProvider>,
        chunks_index: Arc<SharedVectorIndex>,
        items_index: Arc<SharedVectorIndex>,
        search: SearchConfig,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            chunks_index,
            items_index,
            search,
            embedding,
        }
    }

    pub async fn state(&self) -> Result<IndexState> {
        let state = sqlx::query_as::<_, IndexState>(
            "SELECT last_chunk_id, last_item_id, is_building, last_error FROM index_state WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(crate::db::errors::DbError::from)?;
        Ok(state)
    }

    async fn set_state(
        &self,
        last_chunk_id: Option<i64>,
        last_item_id: Option<i64>,
        is_building: Option<bool>,
        last_error: Option<Option<String>>,
    ) -> Result<()> {
        let current = self.state().await?;
        sqlx::query(
            "UPDATE index_state SET last_chunk_id = ?1, last_item_id = ?2, is_building = ?3, last_error = ?4, updated_at = ?5 WHERE id = 1",
        )
        .bind(last_chunk_id.unwrap_or(current.last_chunk_id))
        .bind(last_item_id.unwrap_or(current.last_item_id))
        .bind(is_building.unwrap_or(current.is_building))
        .bind(last_error.unwrap_or(current.last_error))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(crate::db::errors::DbError::from)?;
        Ok(())
    }

    /// Chunk one document's pages into rows (FTS rows appear via trigger),
    /// then embed and publish everything pending. Used by ingest and by the
    /// reindex endpoint.
    #[instrument(skip(self), err)]
    pub async fn index_document(&self, document_id: DocumentId) -> Result<usize> {
        let pages = Documents::pages_for(&self.pool, document_id).await?;

        // Reindex replaces the document's chunk set.
        Documents::delete_chunks_for(&self.pool, document_id).await?;

        let mut inserted = 0;
        let mut conn = self.pool.acquire().await.map_err(crate::db::errors::DbError::from)?;
        for page in &pages {
            let pieces = chunk_text(&page.text, self.search.chunk_size, self.search.chunk_overlap);
            if pieces.is_empty() {
                continue;
            }
            let rows: Vec<(i64, String, i64, i64)> = pieces
                .into_iter()
                .map(|p| (p.index, p.text, p.char_start, p.char_end))
                .collect();
            inserted += rows.len();
            Documents::insert_chunks(&mut conn, document_id, Some(page.id), &rows).await?;
        }
        drop(conn);

        self.index_incremental().await?;
        Documents::set_status(&self.pool, document_id, DocumentStatus::Indexed).await?;
        Ok(inserted)
    }

    /// Embed and publish all chunks and line items past the cursors, in
    /// batches of `embed_batch_size`. Map rows and the cursor advance commit
    /// in one transaction per batch.
    #[instrument(skip(self), err)]
    pub async fn index_incremental(&self) -> Result<(usize, usize)> {
        let batch_size = self.embedding.batch_size.max(1) as i64;
        let mut chunks_done = 0;
        let mut items_done = 0;

        let outcome: Result<()> = async {
            loop {
                let cursor = self.state().await?.last_chunk_id;
                let batch = Documents::chunks_after(&self.pool, cursor, batch_size).await?;
                if batch.is_empty() {
                    break;
                }
                chunks_done += self.publish_chunk_batch(&batch).await?;
            }

            loop {
                let cursor = self.state().await?.last_item_id;
                let batch = Invoices::items_after(&self.pool, cursor, batch_size).await?;
                if batch.is_empty() {
                    break;
                }
                items_done += self.publish_item_batch(&batch).await?;
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                self.set_state(None, None, None, Some(None)).await?;
                Ok((chunks_done, items_done))
            }
            Err(err) => {
                let _ = self
                    .set_state(None, None, None, Some(Some(err.to_string())))
                    .await;
                Err(err)
            }
        }
    }

    async fn publish_chunk_batch(&self, batch: &[ChunkRecord]) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(|c| c.chunk_text.clone()).collect();
        let vectors = self
            .provider
            .embed(&texts)
            .await
            .map_err(|e| Error::Embedding { message: e.to_string() })?;
        let positions = self.chunks_index.append_batch(&vectors).await?;

        let mut tx = self.pool.begin().await.map_err(crate::db::errors::DbError::from)?;
        for (chunk, position) in batch.iter().zip(&positions) {
            sqlx::query(
                "INSERT OR REPLACE INTO vector_map (index_name, position, chunk_id) VALUES ('chunks', ?1, ?2)",
            )
            .bind(*position as i64)
            .bind(chunk.id)
            .execute(&mut *tx)
            .await
            .map_err(crate::db::errors::DbError::from)?;
        }
        let max_id = batch.iter().map(|c| c.id).max().unwrap_or(0);
        sqlx::query("UPDATE index_state SET last_chunk_id = ?1, updated_at = ?2 WHERE id = 1")
            .bind(max_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(crate::db::errors::DbError::from)?;
        tx.commit().await.map_err(crate::db::errors::DbError::from)?;
        Ok(batch.len())
    }

    async fn publish_item_batch(&self, batch: &[LineItemRecord]) -> Result<usize> {
        // Bank-info filter applies to items only; filtered items still
        // advance the cursor so they are never revisited.
        let indexable: Vec<&LineItemRecord> = batch
            .iter()
            .filter(|item| {
                let text = item_index_text(item);
                !is_bank_info(&text)
            })
            .collect();

        let mut published = 0;
        if !indexable.is_empty() {
            let texts: Vec<String> = indexable.iter().map(|i| item_index_text(i)).collect();
            let vectors = self
                .provider
                .embed(&texts)
                .await
                .map_err(|e| Error::Embedding { message: e.to_string() })?;
            let positions = self.items_index.append_batch(&vectors).await?;

            let mut tx = self.pool.begin().await.map_err(crate::db::errors::DbError::from)?;
            for (item, position) in indexable.iter().zip(&positions) {
                sqlx::query(
                    "INSERT OR REPLACE INTO vector_map (index_name, position, item_id) VALUES ('items', ?1, ?2)",
                )
                .bind(*position as i64)
                .bind(item.id)
                .execute(&mut *tx)
                .await
                .map_err(crate::db::errors::DbError::from)?;
            }
            let max_id = batch.iter().map(|i| i.id).max().unwrap_or(0);
            sqlx::query("UPDATE index_state SET last_item_id = ?1, updated_at = ?2 WHERE id = 1")
                .bind(max_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(crate::db::errors::DbError::from)?;
            tx.commit().await.map_err(crate::db::errors::DbError::from)?;
            published = indexable.len();
        } else {
            let max_id = batch.iter().map(|i| i.id).max().unwrap_or(0);
            self.set_state(None, Some(max_id), None, None).await?;
        }
        Ok(published)
    }

    /// Rebuild both vector indexes from scratch. New indexes are staged to
    /// a file and renamed into place, map rows are rewritten in one
    /// transaction, and cursors jump to the high-water marks.
    #[instrument(skip(self), err)]
    pub async fn rebuild_index_full(&self) -> Result<IndexStats> {
        self.set_state(None, None, Some(true), Some(None)).await?;

        let outcome: Result<()> = async {
            // Chunks.
            let chunks = sqlx::query_as::<_, ChunkRecord>("SELECT * FROM chunks ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(crate::db::errors::DbError::from)?;
            let mut chunk_index = VectorIndex::new(self.embedding.dimension);
            let mut chunk_positions: Vec<(RowId, usize)> = Vec::with_capacity(chunks.len());
            for batch in chunks.chunks(self.embedding.batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|c| c.chunk_text.clone()).collect();
                let vectors = self
                    .provider
                    .embed(&texts)
                    .await
                    .map_err(|e| Error::Embedding { message: e.to_string() })?;
                for (chunk, vector) in batch.iter().zip(&vectors) {
                    let position = chunk_index.push(vector)?;
                    chunk_positions.push((chunk.id, position));
                }
            }

            // Items.
            let items = sqlx::query_as::<_, LineItemRecord>(
                "SELECT * FROM line_items WHERE row_type = 'line_item' ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(crate::db::errors::DbError::from)?;
            let mut item_index = VectorIndex::new(self.embedding.dimension);
            let mut item_positions: Vec<(RowId, usize)> = Vec::new();
            let indexable: Vec<&LineItemRecord> = items
                .iter()
                .filter(|item| !is_bank_info(&item_index_text(item)))
                .collect();
            for batch in indexable.chunks(self.embedding.batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|i| item_index_text(i)).collect();
                let vectors = self
                    .provider
                    .embed(&texts)
                    .await
                    .map_err(|e| Error::Embedding { message: e.to_string() })?;
                for (item, vector) in batch.iter().zip(&vectors) {
                    let position = item_index.push(vector)?;
                    item_positions.push((item.id, position));
                }
            }

            // Publish files first (stage + rename), then rewrite map rows and
            // cursors transactionally.
            self.chunks_index.replace(chunk_index).await?;
            self.items_index.replace(item_index).await?;

            let mut tx = self.pool.begin().await.map_err(crate::db::errors::DbError::from)?;
            sqlx::query("DELETE FROM vector_map")
                .execute(&mut *tx)
                .await
                .map_err(crate::db::errors::DbError::from)?;
            for (chunk_id, position) in &chunk_positions {
                sqlx::query("INSERT INTO vector_map (index_name, position, chunk_id) VALUES ('chunks', ?1, ?2)")
                    .bind(*position as i64)
                    .bind(chunk_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(crate::db::errors::DbError::from)?;
            }
            for (item_id, position) in &item_positions {
                sqlx::query("INSERT INTO vector_map (index_name, position, item_id) VALUES ('items', ?1, ?2)")
                    .bind(*position as i64)
                    .bind(item_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(crate::db::errors::DbError::from)?;
            }
            sqlx::query(
                "UPDATE index_state SET last_chunk_id = ?1, last_item_id = ?2, updated_at = ?3 WHERE id = 1",
            )
            .bind(chunks.iter().map(|c| c.id).max().unwrap_or(0))
            .bind(items.iter().map(|i| i.id).max().unwrap_or(0))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(crate::db::errors::DbError::from)?;
            tx.commit().await.map_err(crate::db::errors::DbError::from)?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                self.set_state(None, None, Some(false), Some(None)).await?;
                self.get_stats().await
            }
            Err(err) => {
                let _ = self
                    .set_state(None, None, Some(false), Some(Some(err.to_string())))
                    .await;
                Err(err)
            }
        }
    }

    pub async fn get_stats(&self) -> Result<IndexStats> {
        let documents = Documents::count(&self.pool).await?;
        let chunks = Documents::count_chunks(&self.pool).await?;
        let chunk_map_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_map WHERE index_name = 'chunks'")
                .fetch_one(&self.pool)
                .await
                .map_err(crate::db::errors::DbError::from)?;
        let item_map_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_map WHERE index_name = 'items'")
                .fetch_one(&self.pool)
                .await
                .map_err(crate::db::errors::DbError::from)?;

        let chunk_vectors = self.chunks_index.len();
        let item_vectors = self.items_index.len();
        let state = self.state().await?;

        Ok(IndexStats {
            documents,
            chunks,
            chunk_vectors,
            chunk_map_rows,
            item_vectors,
            item_map_rows,
            parity_ok: chunk_vectors as i64 == chunk_map_rows && item_vectors as i64 == item_map_rows,
            state,
        })
    }
}

fn item_index_text(item: &LineItemRecord) -> String {
    match &item.description {
        Some(description) if !description.trim().is_empty() => {
            format!("{} {}", item.item_name, description)
        }
        _ => item.item_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_window_and_overlap() {
        let words: Vec<String> = (0..25).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");
        let pieces = chunk_text(&text, 10, 2);

        assert_eq!(pieces.len(), 3);
        assert!(pieces[0].text.starts_with("word0"));
        assert!(pieces[0].text.ends_with("word9"));
        // Overlap of 2: next window starts at word8.
        assert!(pieces[1].text.starts_with("word8"));
        assert_eq!(pieces[0].index, 0);
        assert_eq!(pieces[1].index, 1);
    }

    #[test]
    fn short_chunks_are_dropped() {
        assert!(chunk_text("a", 512, 50).is_empty());
        assert_eq!(chunk_text("abc", 512, 50).len(), 1);
        assert!(chunk_text("   ", 512, 50).is_empty());
    }

    #[test]
    fn char_offsets_slice_the_source() {
        let text = "alpha beta gamma delta";
        let pieces = chunk_text(text, 2, 0);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].text, "alpha beta");
        assert_eq!(pieces[0].char_start, 0);
        assert_eq!(pieces[0].char_end, 10);
        assert_eq!(pieces[1].text, "gamma delta");
    }

    #[test]
    fn bank_filter_catches_ibans_swifts_and_keywords() {
        assert!(is_bank_info("IBAN DE89370400440532013000"));
        assert!(is_bank_info("DE89370400440532013000"));
        assert!(is_bank_info("SWIFT: COBADEFFXXX"));
        assert!(is_bank_info("Beneficiary: ACME GmbH"));
        assert!(is_bank_info("تحويل إلى بنك الرياض"));
        assert!(is_bank_info(""));
        assert!(is_bank_info("ab"));

        assert!(!is_bank_info("PVC Cable 10mm"));
        assert!(!is_bank_info("Steel rod 12mm mild steel"));
    }

    mod integration {
        use super::*;
        use crate::config::{EmbeddingConfig, LlmConfig, SearchConfig};
        use crate::db::connect_test;
        use crate::db::handlers::{Documents, Invoices};
        use crate::db::models::{DocumentCreate, PageCreate, PageType};
        use crate::llm::inprocess::InProcessProvider;

        async fn indexer_with(pool: &SqlitePool, dir: &std::path::Path) -> Indexer {
            let embedding = EmbeddingConfig {
                dimension: 32,
                batch_size: 4,
                ..Default::default()
            };
            let provider = Arc::new(InProcessProvider::new(LlmConfig::default(), embedding.clone()));
            let chunks_index =
                Arc::new(SharedVectorIndex::open(dir.join("faiss_chunks.bin"), 32).await);
            let items_index =
                Arc::new(SharedVectorIndex::open(dir.join("faiss_items.bin"), 32).await);
            Indexer::new(
                pool.clone(),
                provider,
                chunks_index,
                items_index,
                SearchConfig {
                    chunk_size: 8,
                    chunk_overlap: 2,
                    ..Default::default()
                },
                embedding,
            )
        }

        async fn seed_document(pool: &SqlitePool, text: &str) -> DocumentId {
            let doc = Documents::create(
                pool,
                &DocumentCreate {
                    filename: "doc.txt".to_string(),
                    file_path: "data/documents/doc.txt".to_string(),
                    content_hash: uuid::Uuid::new_v4().to_string(),
                    size_bytes: text.len() as i64,
                    mime_type: "text/plain".to_string(),
                    company_key: None,
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
            Documents::insert_pages(
                pool,
                doc.id,
                &[PageCreate {
                    page_number: 1,
                    page_type: PageType::Other,
                    type_confidence: 0.5,
                    text: text.to_string(),
                    image_hash: None,
                }],
            )
            .await
            .unwrap();
            doc.id
        }

        #[tokio::test]
        async fn index_document_maintains_parity() {
            let pool = connect_test().await;
            let dir = tempfile::tempdir().unwrap();
            let indexer = indexer_with(&pool, dir.path()).await;

            let doc_id = seed_document(
                &pool,
                "centrifugal pump for water transfer with stainless impeller and sealed bearings rated ten bar",
            )
            .await;
            let inserted = indexer.index_document(doc_id).await.unwrap();
            assert!(inserted > 0);

            let stats = indexer.get_stats().await.unwrap();
            assert!(stats.parity_ok, "chunks={} vectors={} map={}", stats.chunks, stats.chunk_vectors, stats.chunk_map_rows);
            assert_eq!(stats.chunks as usize, stats.chunk_vectors);
        }

        #[tokio::test]
        async fn incremental_is_idempotent_when_caught_up() {
            let pool = connect_test().await;
            let dir = tempfile::tempdir().unwrap();
            let indexer = indexer_with(&pool, dir.path()).await;

            let doc_id = seed_document(&pool, "one two three four five six seven eight nine ten").await;
            indexer.index_document(doc_id).await.unwrap();
            let before = indexer.get_stats().await.unwrap();

            let (chunks, items) = indexer.index_incremental().await.unwrap();
            assert_eq!((chunks, items), (0, 0));
            let after = indexer.get_stats().await.unwrap();
            assert_eq!(after.chunk_vectors, before.chunk_vectors);
        }

        #[tokio::test]
        async fn items_index_skips_bank_rows_but_advances_cursor() {
            let pool = connect_test().await;
            let dir = tempfile::tempdir().unwrap();
            let indexer = indexer_with(&pool, dir.path()).await;

            let request = crate::db::handlers::invoices::tests::invoice_request();
            let items = vec![
                crate::db::handlers::invoices::tests::item("PVC Cable 10mm", 10.0, 5.0, 50.0),
                crate::db::handlers::invoices::tests::item("IBAN DE89370400440532013000", 1.0, 1.0, 1.0),
            ];
            Invoices::create_with_items(&pool, &request, &items).await.unwrap();

            indexer.index_incremental().await.unwrap();
            let stats = indexer.get_stats().await.unwrap();
            assert_eq!(stats.item_vectors, 1);
            assert!(stats.parity_ok);

            // Cursor covers the filtered row too.
            assert!(stats.state.last_item_id >= 2);
        }

        #[tokio::test]
        async fn full_rebuild_compacts_and_restores_parity() {
            let pool = connect_test().await;
            let dir = tempfile::tempdir().unwrap();
            let indexer = indexer_with(&pool, dir.path()).await;

            let keep = seed_document(&pool, "pump station maintenance log with impeller notes").await;
            let drop_me = seed_document(&pool, "packing list for shipment of steel rods and cables").await;
            indexer.index_document(keep).await.unwrap();
            indexer.index_document(drop_me).await.unwrap();

            Documents::delete(&pool, drop_me).await.unwrap();
            let stats = indexer.rebuild_index_full().await.unwrap();
            assert!(stats.parity_ok);
            assert_eq!(stats.chunks as usize, stats.chunk_vectors);
            assert!(!stats.state.is_building);
        }
    }
}
