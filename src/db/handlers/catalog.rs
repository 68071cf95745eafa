//! Database repository for the materials catalog.

use crate::db::errors::Result;
use crate::db::models::{MaterialCreate, MaterialRecord, SynonymRecord};
use crate::types::{MaterialId, new_material_id};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;

pub struct Materials;

/// Sanitize free text into an FTS5 MATCH expression: each token quoted, so
/// user input can never produce a query syntax error.
pub fn fts_match_expression(text: &str) -> String {
    text.split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Materials {
    /// Create a material. `normalized_name` derives from the display name;
    /// the unique index enforces one material per normalized name.
    #[instrument(skip(pool, request), fields(name = %request.display_name), err)]
    pub async fn create(pool: &SqlitePool, request: &MaterialCreate) -> Result<MaterialRecord> {
        let id = new_material_id();
        let normalized = request.display_name.trim().to_lowercase();
        let record = sqlx::query_as::<_, MaterialRecord>(
            r#"
            INSERT INTO materials
                (id, display_name, normalized_name, hs_code, category, unit,
                 description, brand, origin_country, source_url, evidence_text)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(request.display_name.trim())
        .bind(&normalized)
        .bind(&request.hs_code)
        .bind(&request.category)
        .bind(&request.unit)
        .bind(&request.description)
        .bind(&request.brand)
        .bind(&request.origin_country)
        .bind(&request.source_url)
        .bind(&request.evidence_text)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn get(pool: &SqlitePool, id: &MaterialId) -> Result<Option<MaterialRecord>> {
        let record = sqlx::query_as::<_, MaterialRecord>("SELECT * FROM materials WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(record)
    }

    pub async fn get_by_normalized(pool: &SqlitePool, normalized_name: &str) -> Result<Option<MaterialRecord>> {
        let record = sqlx::query_as::<_, MaterialRecord>(
            "SELECT * FROM materials WHERE normalized_name = ?1",
        )
        .bind(normalized_name)
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }

    /// Exact synonym text match.
    pub async fn find_by_synonym(pool: &SqlitePool, synonym: &str) -> Result<Option<MaterialRecord>> {
        let record = sqlx::query_as::<_, MaterialRecord>(
            r#"
            SELECT m.* FROM materials m
            JOIN material_synonyms s ON s.material_id = m.id
            WHERE s.synonym = ?1
            LIMIT 1
            "#,
        )
        .bind(synonym)
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }

    /// Idempotent synonym append.
    pub async fn add_synonym(pool: &SqlitePool, material_id: &MaterialId, synonym: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO material_synonyms (material_id, synonym) VALUES (?1, ?2)
             ON CONFLICT (material_id, synonym) DO NOTHING",
        )
        .bind(material_id)
        .bind(synonym)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn synonyms_for(pool: &SqlitePool, material_id: &MaterialId) -> Result<Vec<SynonymRecord>> {
        let records = sqlx::query_as::<_, SynonymRecord>(
            "SELECT id, material_id, synonym FROM material_synonyms WHERE material_id = ?1 ORDER BY id",
        )
        .bind(material_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Fill in hs_code/unit from an observed line item when the catalog
    /// entry is missing them. Existing values win.
    pub async fn backfill(
        pool: &SqlitePool,
        material_id: &MaterialId,
        hs_code: Option<&str>,
        unit: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE materials
            SET hs_code = COALESCE(hs_code, ?2),
                unit = COALESCE(unit, ?3),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(material_id)
        .bind(hs_code)
        .bind(unit)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<MaterialRecord>> {
        let limit = if limit > 0 { limit } else { 100 };
        let records = sqlx::query_as::<_, MaterialRecord>(
            "SELECT * FROM materials ORDER BY normalized_name LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Lexical suggestions for an unmatched item name: best-ranked catalog
    /// entries from the FTS mirror. Never raises; index errors yield an
    /// empty list.
    pub async fn suggest(pool: &SqlitePool, item_name: &str, limit: i64) -> Vec<MaterialRecord> {
        let expression = fts_match_expression(item_name);
        if expression.is_empty() {
            return Vec::new();
        }
        let result = sqlx::query_as::<_, MaterialRecord>(
            r#"
            SELECT m.* FROM materials_fts
            JOIN materials m ON m.rowid = materials_fts.rowid
            WHERE materials_fts MATCH ?1
            ORDER BY bm25(materials_fts)
            LIMIT ?2
            "#,
        )
        .bind(&expression)
        .bind(limit)
        .fetch_all(pool)
        .await;

        match result {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "material suggestion query failed; returning empty list");
                Vec::new()
            }
        }
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM materials")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
