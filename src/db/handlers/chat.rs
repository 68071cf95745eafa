//! Database repositories for chat sessions, messages, and memory facts.

use crate::db::errors::Result;
use crate::db::models::{
    MemoryFactRecord, MemoryFactUpsert, MessageRecord, MessageRole, MessageType, SessionRecord,
    SessionStatus,
};
use crate::types::{RowId, SessionId};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub struct Sessions;

impl Sessions {
    #[instrument(skip(pool), err)]
    pub async fn create(
        pool: &SqlitePool,
        title: Option<&str>,
        system_prompt: Option<&str>,
        max_context_tokens: i64,
        temperature: f64,
    ) -> Result<SessionRecord> {
        let id = Uuid::new_v4();
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            INSERT INTO chat_sessions (id, title, system_prompt, max_context_tokens, temperature)
            VALUES (?1, COALESCE(?2, 'New session'), ?3, ?4, ?5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(system_prompt)
        .bind(max_context_tokens)
        .bind(temperature)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn get(pool: &SqlitePool, id: SessionId) -> Result<Option<SessionRecord>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM chat_sessions WHERE id = ?1 AND status != 'deleted'",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(record)
    }

    pub async fn list(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<SessionRecord>> {
        let limit = if limit > 0 { limit } else { 50 };
        let records = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM chat_sessions WHERE status != 'deleted' ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Soft delete; messages stay until the row itself is purged.
    pub async fn delete(pool: &SqlitePool, id: SessionId) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE chat_sessions SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status != 'deleted'",
        )
        .bind(id)
        .bind(SessionStatus::Deleted)
        .bind(Utc::now())
        .execute(pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn add_message(
        pool: &SqlitePool,
        session_id: SessionId,
        role: MessageRole,
        content: &str,
        message_type: MessageType,
        context_used: Option<&str>,
        sources_json: Option<&str>,
        token_count: i64,
    ) -> Result<MessageRecord> {
        let mut tx = pool.begin().await?;
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages
                (session_id, role, content, message_type, context_used, sources_json, token_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(message_type)
        .bind(context_used)
        .bind(sources_json)
        .bind(token_count)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_sessions SET total_tokens = total_tokens + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(session_id)
        .bind(token_count)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn messages(pool: &SqlitePool, session_id: SessionId) -> Result<Vec<MessageRecord>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Store a conversation summary covering the oldest `covered` messages.
    pub async fn set_summary(
        pool: &SqlitePool,
        session_id: SessionId,
        summary: &str,
        covered: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE chat_sessions
            SET summary = ?2, summary_message_count = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(session_id)
        .bind(summary)
        .bind(covered)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_title(pool: &SqlitePool, session_id: SessionId, title: &str) -> Result<()> {
        sqlx::query("UPDATE chat_sessions SET title = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(session_id)
            .bind(title)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }
}

pub struct Memory;

impl Memory {
    /// Upsert on `(session_id, key)`: new facts insert, existing keys update
    /// the value and bump the access counter.
    #[instrument(skip(pool, fact), fields(key = %fact.key), err)]
    pub async fn upsert(pool: &SqlitePool, fact: &MemoryFactUpsert) -> Result<MemoryFactRecord> {
        let record = sqlx::query_as::<_, MemoryFactRecord>(
            r#"
            INSERT INTO memory_facts (session_id, fact_type, key, value, confidence, access_count, last_accessed)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            ON CONFLICT (session_id, key) DO UPDATE SET
                value = excluded.value,
                fact_type = excluded.fact_type,
                confidence = excluded.confidence,
                access_count = access_count + 1,
                last_accessed = excluded.last_accessed
            RETURNING *
            "#,
        )
        .bind(fact.session_id)
        .bind(fact.fact_type)
        .bind(&fact.key)
        .bind(&fact.value)
        .bind(fact.confidence)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    pub async fn for_session(pool: &SqlitePool, session_id: SessionId) -> Result<Vec<MemoryFactRecord>> {
        let records = sqlx::query_as::<_, MemoryFactRecord>(
            "SELECT * FROM memory_facts WHERE session_id = ?1 ORDER BY key",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn delete_expired(pool: &SqlitePool) -> Result<u64> {
        let affected = sqlx::query("DELETE FROM memory_facts WHERE expires_at IS NOT NULL AND expires_at < ?1")
            .bind(Utc::now())
            .execute(pool)
            .await?
            .rows_affected();
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_test;
    use crate::db::models::FactType;

    #[tokio::test]
    async fn message_insert_accumulates_session_tokens() {
        let pool = connect_test().await;
        let session = Sessions::create(&pool, None, None, 4096, 0.7).await.unwrap();

        Sessions::add_message(&pool, session.id, MessageRole::User, "hello there", MessageType::Text, None, None, 2)
            .await
            .unwrap();
        Sessions::add_message(&pool, session.id, MessageRole::Assistant, "hi", MessageType::Text, None, None, 1)
            .await
            .unwrap();

        let after = Sessions::get(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(after.total_tokens, 3);
        assert_eq!(Sessions::messages(&pool, session.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn memory_upsert_bumps_access_count_on_existing_key() {
        let pool = connect_test().await;
        let session = Sessions::create(&pool, None, None, 4096, 0.7).await.unwrap();
        let fact = MemoryFactUpsert {
            session_id: Some(session.id),
            fact_type: FactType::Entity,
            key: "buyer".to_string(),
            value: "Globex".to_string(),
            confidence: 0.8,
        };

        let first = Memory::upsert(&pool, &fact).await.unwrap();
        assert_eq!(first.access_count, 0);

        let updated = MemoryFactUpsert {
            value: "Globex Corporation".to_string(),
            ..fact
        };
        let second = Memory::upsert(&pool, &updated).await.unwrap();
        assert_eq!(second.access_count, 1);
        assert_eq!(second.value, "Globex Corporation");
    }

    #[tokio::test]
    async fn soft_delete_hides_session() {
        let pool = connect_test().await;
        let session = Sessions::create(&pool, Some("t"), None, 4096, 0.7).await.unwrap();
        assert!(Sessions::delete(&pool, session.id).await.unwrap());
        assert!(Sessions::get(&pool, session.id).await.unwrap().is_none());
    }
}
