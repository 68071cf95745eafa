//! Database repository for reminders, user-created and insight-derived.

use crate::db::errors::Result;
use crate::db::models::{ReminderCreate, ReminderRecord, Severity};
use crate::types::ReminderId;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub struct Reminders;

impl Reminders {
    #[instrument(skip(pool, request), fields(title = %request.title), err)]
    pub async fn create(pool: &SqlitePool, request: &ReminderCreate) -> Result<ReminderRecord> {
        let id = Uuid::new_v4();
        let record = sqlx::query_as::<_, ReminderRecord>(
            r#"
            INSERT INTO reminders
                (id, title, body, due_date, severity, linked_entity_type, linked_entity_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.body)
        .bind(request.due_date)
        .bind(request.severity.unwrap_or(Severity::Info))
        .bind(&request.linked_entity_type)
        .bind(&request.linked_entity_id)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn get(pool: &SqlitePool, id: ReminderId) -> Result<Option<ReminderRecord>> {
        let record = sqlx::query_as::<_, ReminderRecord>("SELECT * FROM reminders WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(record)
    }

    pub async fn list(pool: &SqlitePool, include_done: bool, skip: i64, limit: i64) -> Result<Vec<ReminderRecord>> {
        let limit = if limit > 0 { limit } else { 100 };
        let records = sqlx::query_as::<_, ReminderRecord>(
            r#"
            SELECT * FROM reminders
            WHERE (?1 OR is_done = 0)
            ORDER BY due_date IS NULL, due_date, created_at
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(include_done)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn set_done(pool: &SqlitePool, id: ReminderId, done: bool) -> Result<Option<ReminderRecord>> {
        let record = sqlx::query_as::<_, ReminderRecord>(
            "UPDATE reminders SET is_done = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .bind(done)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }

    pub async fn delete(pool: &SqlitePool, id: ReminderId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM reminders WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// True when an active (not-done) reminder already tracks the linked
    /// entity. Used to keep the insight evaluator idempotent.
    pub async fn active_exists_for(
        pool: &SqlitePool,
        linked_entity_type: &str,
        linked_entity_id: &str,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reminders WHERE linked_entity_type = ?1 AND linked_entity_id = ?2 AND is_done = 0",
        )
        .bind(linked_entity_type)
        .bind(linked_entity_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_test;

    #[tokio::test]
    async fn active_lookup_ignores_done_reminders() {
        let pool = connect_test().await;
        let created = Reminders::create(
            &pool,
            &ReminderCreate {
                title: "Renew trade license".to_string(),
                linked_entity_type: Some("insight:expiring_doc".to_string()),
                linked_entity_id: Some("doc-1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(Reminders::active_exists_for(&pool, "insight:expiring_doc", "doc-1").await.unwrap());

        Reminders::set_done(&pool, created.id, true).await.unwrap();
        assert!(!Reminders::active_exists_for(&pool, "insight:expiring_doc", "doc-1").await.unwrap());
    }
}
