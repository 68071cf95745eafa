//! Hybrid retrieval: dense vectors + lexical FTS fused by RRF.
//!
//! The hybrid path embeds the query once, races the vector scan and the
//! FTS5 query under a shared deadline, deduplicates per source by document,
//! fuses with Reciprocal Rank Fusion (`k = 60`, frozen), optionally
//! reranks with a cross-encoder, max-scales scores into [0, 1], and caches
//! the result. Sub-source failures degrade to the surviving strategy and
//! mark the response; both sources down is `INDEX_NOT_READY`.

pub mod cache;
pub mod rerank;
pub mod vector;

use crate::config::{CacheConfig, LlmConfig, SearchConfig};
use crate::db::handlers::catalog::fts_match_expression;
use crate::errors::{Error, Result};
use crate::llm::ModelProvider;
use crate::types::{DocumentId, RowId};
use cache::{CacheStats, SearchCache};
use rerank::Reranker;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use utoipa::ToSchema;
use vector::SharedVectorIndex;

/// Frozen RRF constant. Tests pin the formula `1 / (RRF_K + rank + 1)`.
pub const RRF_K: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    #[default]
    Hybrid,
    Semantic,
    Keyword,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<uuid::Uuid>>)]
    pub document_ids: Option<Vec<DocumentId>>,
}

impl SearchFilters {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.company_key.hash(&mut hasher);
        if let Some(ids) = &self.document_ids {
            let mut sorted = ids.clone();
            sorted.sort();
            sorted.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub strategy: SearchStrategy,
    pub use_reranker: bool,
    pub use_cache: bool,
    pub filters: SearchFilters,
    pub min_score: f64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            top_k: 10,
            strategy: SearchStrategy::Hybrid,
            use_reranker: false,
            use_cache: true,
            filters: SearchFilters::default(),
            min_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Hybrid,
    FaissOnly,
    FtsOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchHit {
    pub chunk_id: RowId,
    #[schema(value_type = uuid::Uuid)]
    pub document_id: DocumentId,
    pub page_id: Option<RowId>,
    pub text: String,
    pub score: f64,
    pub source: HitSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RankedResults {
    pub results: Vec<SearchHit>,
    pub strategy: SearchStrategy,
    pub degraded: bool,
    pub reranked: bool,
    pub cache_hit: bool,
    pub took_ms: u64,
}

impl RankedResults {
    fn empty(strategy: SearchStrategy) -> Self {
        Self {
            results: Vec::new(),
            strategy,
            degraded: false,
            reranked: false,
            cache_hit: false,
            took_ms: 0,
        }
    }
}

/// One chunk candidate from either sub-source, in source rank order.
#[derive(Debug, Clone, sqlx::FromRow)]
struct Candidate {
    chunk_id: RowId,
    document_id: DocumentId,
    page_id: Option<RowId>,
    text: String,
}

pub struct HybridRetriever {
    pool: SqlitePool,
    provider: Arc<dyn ModelProvider>,
    chunks_index: Arc<SharedVectorIndex>,
    cache: SearchCache,
    reranker: Reranker,
    config: SearchConfig,
}

impl HybridRetriever {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn ModelProvider>,
        chunks_index: Arc<SharedVectorIndex>,
        search_config: SearchConfig,
        cache_config: &CacheConfig,
        llm_config: &LlmConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            chunks_index,
            cache: SearchCache::new(cache_config),
            reranker: Reranker::new(llm_config),
            config: search_config,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_invalidate(&self) {
        self.cache.invalidate_all();
    }

    pub async fn search_semantic(&self, request: &SearchRequest) -> Result<RankedResults> {
        let request = SearchRequest {
            strategy: SearchStrategy::Semantic,
            ..request.clone()
        };
        self.search(&request).await
    }

    pub async fn search_keyword(&self, request: &SearchRequest) -> Result<RankedResults> {
        let request = SearchRequest {
            strategy: SearchStrategy::Keyword,
            ..request.clone()
        };
        self.search(&request).await
    }

    #[instrument(skip(self, request), fields(strategy = ?request.strategy, top_k = request.top_k))]
    pub async fn search(&self, request: &SearchRequest) -> Result<RankedResults> {
        let started = Instant::now();
        let canonical = request.query.trim();
        if canonical.is_empty() {
            return Ok(RankedResults::empty(request.strategy));
        }

        let cache_key = format!(
            "{}|{:?}|{}|{}|{:016x}",
            canonical.to_lowercase(),
            request.strategy,
            request.top_k,
            request.use_reranker,
            request.filters.fingerprint(),
        );

        if request.use_cache {
            if let Some(cached) = self.cache.get(&cache_key).await {
                let mut results = RankedResults::clone(&cached);
                results.cache_hit = true;
                results.took_ms = started.elapsed().as_millis() as u64;
                return Ok(results);
            }
        }

        let deadline = Duration::from_secs(self.config.query_timeout.max(1));
        let mut degraded = false;

        let (semantic, lexical) = match request.strategy {
            SearchStrategy::Semantic => {
                let candidates = tokio::time::timeout(deadline, self.semantic_candidates(canonical, &request.filters))
                    .await
                    .map_err(|_| Error::Embedding {
                        message: "semantic search timed out".to_string(),
                    })??;
                (candidates, Vec::new())
            }
            SearchStrategy::Keyword => {
                let candidates = tokio::time::timeout(deadline, self.lexical_candidates(canonical, &request.filters))
                    .await
                    .map_err(|_| Error::IndexNotReady)??;
                (Vec::new(), candidates)
            }
            SearchStrategy::Hybrid => {
                // One shared deadline covers both sub-queries.
                let (semantic_result, lexical_result) = tokio::join!(
                    tokio::time::timeout(deadline, self.semantic_candidates(canonical, &request.filters)),
                    tokio::time::timeout(deadline, self.lexical_candidates(canonical, &request.filters)),
                );
                let semantic_result = semantic_result.unwrap_or_else(|_| {
                    Err(Error::Embedding {
                        message: "semantic sub-query timed out".to_string(),
                    })
                });
                let lexical_result = lexical_result.unwrap_or(Err(Error::IndexNotReady));

                match (semantic_result, lexical_result) {
                    (Ok(semantic), Ok(lexical)) => (semantic, lexical),
                    (Err(err), Ok(lexical)) => {
                        tracing::warn!(error = %err, "semantic sub-source failed; degrading to keyword-only");
                        degraded = true;
                        (Vec::new(), lexical)
                    }
                    (Ok(semantic), Err(err)) => {
                        tracing::warn!(error = %err, "lexical sub-source failed; degrading to semantic-only");
                        degraded = true;
                        (semantic, Vec::new())
                    }
                    (Err(semantic_err), Err(lexical_err)) => {
                        tracing::error!(
                            semantic = %semantic_err,
                            lexical = %lexical_err,
                            "both retrieval sub-sources failed"
                        );
                        return Err(Error::IndexNotReady);
                    }
                }
            }
        };

        let mut hits = rrf_fuse(&semantic, &lexical);

        // Rerank over the merged candidate pool, then keep top_k.
        let mut reranked = false;
        if request.use_reranker && self.config.reranker_enabled && !hits.is_empty() {
            let pool_size = self.config.faiss_candidates + self.config.fts_candidates;
            hits.truncate(pool_size);
            let documents: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();
            match self.reranker.score(canonical, &documents).await {
                Ok(scores) => {
                    for (hit, score) in hits.iter_mut().zip(&scores) {
                        hit.score = *score;
                    }
                    hits.sort_by(|a, b| {
                        b.score
                            .partial_cmp(&a.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(a.document_id.cmp(&b.document_id))
                    });
                    reranked = true;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "reranker failed; keeping fusion order");
                }
            }
        }
        hits.truncate(request.top_k);

        // Max-scale into [0, 1], then apply the floor.
        let max_score = hits.iter().map(|h| h.score).fold(0.0_f64, f64::max);
        if max_score > 0.0 {
            for hit in &mut hits {
                hit.score /= max_score;
            }
        }
        if request.min_score > 0.0 {
            hits.retain(|hit| hit.score >= request.min_score);
        }

        let results = RankedResults {
            results: hits,
            strategy: request.strategy,
            degraded,
            reranked,
            cache_hit: false,
            took_ms: started.elapsed().as_millis() as u64,
        };

        if request.use_cache {
            self.cache.insert(cache_key, Arc::new(results.clone())).await;
        }
        Ok(results)
    }

    /// Vector sub-query: embed once, scan the shared index, resolve hit
    /// positions to chunks through the map table.
    async fn semantic_candidates(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let embedding = self
            .provider
            .embed_single(query)
            .await
            .map_err(|e| Error::Embedding { message: e.to_string() })?;

        let snapshot = self.chunks_index.snapshot();
        let positions = snapshot.search(&embedding, self.config.faiss_candidates);
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; positions.len()].join(", ");
        let sql = format!(
            r#"
            SELECT vm.position AS position, c.id AS chunk_id, c.document_id AS document_id,
                   c.page_id AS page_id, c.chunk_text AS text
            FROM vector_map vm
            JOIN chunks c ON c.id = vm.chunk_id
            JOIN documents d ON d.id = c.document_id
            WHERE vm.index_name = 'chunks' AND vm.position IN ({placeholders})
              AND (? IS NULL OR d.company_key = ?)
            "#,
        );

        #[derive(sqlx::FromRow)]
        struct PositionedCandidate {
            position: i64,
            chunk_id: RowId,
            document_id: DocumentId,
            page_id: Option<RowId>,
            text: String,
        }

        let mut query_builder = sqlx::query_as::<_, PositionedCandidate>(&sql);
        for (position, _) in &positions {
            query_builder = query_builder.bind(*position as i64);
        }
        query_builder = query_builder
            .bind(&filters.company_key)
            .bind(&filters.company_key);

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(crate::db::errors::DbError::from)?;

        let by_position: HashMap<i64, PositionedCandidate> =
            rows.into_iter().map(|row| (row.position, row)).collect();

        // Preserve vector rank order; drop positions whose map row is gone
        // (deleted documents awaiting rebuild compaction).
        let allowed = filters.document_ids.as_ref();
        let candidates = positions
            .iter()
            .filter_map(|(position, _)| by_position.get(&(*position as i64)))
            .filter(|row| allowed.is_none_or(|ids| ids.contains(&row.document_id)))
            .map(|row| Candidate {
                chunk_id: row.chunk_id,
                document_id: row.document_id,
                page_id: row.page_id,
                text: row.text.clone(),
            })
            .collect();
        Ok(candidates)
    }

    /// Lexical sub-query over the FTS5 mirror, best-first by BM25.
    async fn lexical_candidates(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let expression = fts_match_expression(query);
        if expression.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT c.id AS chunk_id, c.document_id AS document_id, c.page_id AS page_id,
                   c.chunk_text AS text
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.rowid
            JOIN documents d ON d.id = c.document_id
            WHERE chunks_fts MATCH ?1
              AND (?2 IS NULL OR d.company_key = ?2)
            ORDER BY bm25(chunks_fts)
            LIMIT ?3
            "#,
        )
        .bind(&expression)
        .bind(&filters.company_key)
        .bind(self.config.fts_candidates as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::db::errors::DbError::from)?;

        let allowed = filters.document_ids.as_ref();
        Ok(rows
            .into_iter()
            .filter(|row| allowed.is_none_or(|ids| ids.contains(&row.document_id)))
            .collect())
    }
}

/// Reciprocal rank fusion at document granularity.
///
/// Each source is deduplicated by `document_id` first (best rank wins), so a
/// document present in both sources contributes exactly two terms. Ordering
/// is deterministic: fused score descending, then semantic rank ascending,
/// then `document_id` ascending.
fn rrf_fuse(semantic: &[Candidate], lexical: &[Candidate]) -> Vec<SearchHit> {
    struct Fused<'a> {
        candidate: &'a Candidate,
        semantic_rank: Option<usize>,
        lexical_rank: Option<usize>,
    }

    let mut fused: HashMap<DocumentId, Fused> = HashMap::new();

    for (rank, candidate) in dedup_by_document(semantic) {
        fused
            .entry(candidate.document_id)
            .or_insert(Fused {
                candidate,
                semantic_rank: None,
                lexical_rank: None,
            })
            .semantic_rank = Some(rank);
    }
    for (rank, candidate) in dedup_by_document(lexical) {
        let entry = fused.entry(candidate.document_id).or_insert(Fused {
            candidate,
            semantic_rank: None,
            lexical_rank: None,
        });
        entry.lexical_rank = Some(rank);
    }

    let rrf = |rank: usize| 1.0 / (RRF_K as f64 + rank as f64 + 1.0);

    let mut hits: Vec<SearchHit> = fused
        .into_values()
        .map(|entry| {
            let score = entry.semantic_rank.map(rrf).unwrap_or(0.0)
                + entry.lexical_rank.map(rrf).unwrap_or(0.0);
            let source = match (entry.semantic_rank, entry.lexical_rank) {
                (Some(_), Some(_)) => HitSource::Hybrid,
                (Some(_), None) => HitSource::FaissOnly,
                (None, Some(_)) => HitSource::FtsOnly,
                (None, None) => unreachable!("fused entry with no source"),
            };
            SearchHit {
                chunk_id: entry.candidate.chunk_id,
                document_id: entry.candidate.document_id,
                page_id: entry.candidate.page_id,
                text: entry.candidate.text.clone(),
                score,
                source,
                semantic_rank: entry.semantic_rank,
                lexical_rank: entry.lexical_rank,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.semantic_rank
                    .unwrap_or(usize::MAX)
                    .cmp(&b.semantic_rank.unwrap_or(usize::MAX))
            })
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    hits
}

/// First occurrence per document, keeping source rank order.
fn dedup_by_document(candidates: &[Candidate]) -> Vec<(usize, &Candidate)> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .iter()
        .filter(|candidate| seen.insert(candidate.document_id))
        .enumerate()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn candidate(doc: Uuid, chunk_id: RowId, text: &str) -> Candidate {
        Candidate {
            chunk_id,
            document_id: doc,
            page_id: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn rrf_formula_is_frozen() {
        let doc = Uuid::new_v4();
        let hits = rrf_fuse(&[candidate(doc, 1, "a")], &[candidate(doc, 1, "a")]);
        assert_eq!(hits.len(), 1);
        // Rank 0 in both sources: 1/61 + 1/61.
        assert!((hits[0].score - (2.0 / 61.0)).abs() < 1e-12);
        assert_eq!(hits[0].source, HitSource::Hybrid);
    }

    #[test]
    fn equal_scores_break_ties_by_semantic_rank_then_doc_id() {
        // D1: vector rank 0, lexical rank 1. D2: vector rank 1, lexical rank 0.
        let d1 = Uuid::from_u128(1);
        let d2 = Uuid::from_u128(2);
        let semantic = vec![candidate(d1, 1, "d1"), candidate(d2, 2, "d2")];
        let lexical = vec![candidate(d2, 2, "d2"), candidate(d1, 1, "d1")];

        let hits = rrf_fuse(&semantic, &lexical);
        assert_eq!(hits.len(), 2);
        // Scores are 1/61 + 1/62 on both sides: equal, resolved by vector rank.
        assert!((hits[0].score - hits[1].score).abs() < 1e-12);
        assert_eq!(hits[0].document_id, d1);
        assert_eq!(hits[1].document_id, d2);
    }

    #[test]
    fn single_source_results_are_tagged() {
        let d1 = Uuid::from_u128(1);
        let d2 = Uuid::from_u128(2);
        let hits = rrf_fuse(&[candidate(d1, 1, "a")], &[candidate(d2, 2, "b")]);
        let sources: Vec<HitSource> = hits.iter().map(|h| h.source).collect();
        assert!(sources.contains(&HitSource::FaissOnly));
        assert!(sources.contains(&HitSource::FtsOnly));
    }

    #[test]
    fn per_source_dedup_keeps_best_rank() {
        let d1 = Uuid::from_u128(1);
        let semantic = vec![candidate(d1, 1, "best"), candidate(d1, 2, "worse")];
        let hits = rrf_fuse(&semantic, &[]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, 1);
        assert_eq!(hits[0].semantic_rank, Some(0));
    }
}
