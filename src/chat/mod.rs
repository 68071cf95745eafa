//! Session orchestration: context assembly, generation, streaming, and
//! memory fact extraction.
//!
//! The prompt is assembled from the session's system prompt, the stored
//! conversation summary (when present), the recent message window, and
//! retrieved context truncated to the character budget best-scores-first.
//! Streaming persists the assistant message only when the provider stream
//! runs to completion; an abandoned stream writes nothing.

use crate::config::ChatConfig;
use crate::db::handlers::{Memory, Sessions};
use crate::db::models::{
    FactType, MemoryFactUpsert, MessageRecord, MessageRole, MessageType, SessionRecord,
};
use crate::errors::{Entity, Error, Result};
use crate::json_repair::repair_json;
use crate::llm::{GenerateOptions, ModelProvider};
use crate::search::{HybridRetriever, RankedResults, SearchRequest, SearchStrategy};
use crate::types::{DocumentId, RowId, SessionId, approx_tokens};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub session_id: Option<SessionId>,
    pub use_rag: bool,
    pub top_k: usize,
    pub max_context_length: usize,
    pub extract_memory: bool,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            session_id: None,
            use_rag: true,
            top_k: 5,
            max_context_length: 4000,
            extract_memory: false,
            system_prompt: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Citation {
    #[schema(value_type = uuid::Uuid)]
    pub document_id: DocumentId,
    pub chunk_id: RowId,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatResponse {
    #[schema(value_type = uuid::Uuid)]
    pub session_id: SessionId,
    pub message: MessageRecord,
    pub citations: Vec<Citation>,
    pub memory_updates: usize,
    pub degraded: bool,
}

/// Events on the streaming path, rendered by the SSE handler as
/// `data: <token>`, `data: [DONE]`, `data: [ERROR] <msg>`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    Done,
    Error(String),
}

pub struct ChatOrchestrator {
    pool: SqlitePool,
    provider: Arc<dyn ModelProvider>,
    retriever: Arc<HybridRetriever>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn ModelProvider>,
        retriever: Arc<HybridRetriever>,
        config: ChatConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            retriever,
            config,
        }
    }

    async fn ensure_session(&self, opts: &ChatOptions) -> Result<SessionRecord> {
        match opts.session_id {
            Some(id) => Sessions::get(&self.pool, id).await?.ok_or_else(|| Error::NotFound {
                entity: Entity::Session,
                id: id.to_string(),
            }),
            None => Ok(Sessions::create(
                &self.pool,
                None,
                opts.system_prompt.as_deref(),
                self.config.default_max_context_tokens,
                opts.temperature.unwrap_or(self.config.default_temperature),
            )
            .await?),
        }
    }

    /// Retrieved context, truncated to the char budget in score order. A
    /// session pinned to specific documents searches only those.
    async fn assemble_context(
        &self,
        session: &SessionRecord,
        user_text: &str,
        opts: &ChatOptions,
    ) -> (Option<RankedResults>, String, Vec<Citation>) {
        if !opts.use_rag {
            return (None, String::new(), Vec::new());
        }

        let active_documents: Vec<DocumentId> =
            serde_json::from_str(&session.active_document_ids).unwrap_or_default();
        let mut filters = crate::search::SearchFilters::default();
        if !active_documents.is_empty() {
            filters.document_ids = Some(active_documents);
        }

        let request = SearchRequest {
            query: user_text.to_string(),
            top_k: opts.top_k.clamp(1, 20),
            strategy: SearchStrategy::Hybrid,
            filters,
            ..Default::default()
        };
        let results = match self.retriever.search(&request).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "context retrieval failed; answering without context");
                return (None, String::new(), Vec::new());
            }
        };

        let budget = opts.max_context_length.clamp(500, 16_000);
        let mut context = String::new();
        let mut citations = Vec::new();
        for hit in &results.results {
            if context.len() + hit.text.len() + 1 > budget {
                continue;
            }
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str(&hit.text);
            citations.push(Citation {
                document_id: hit.document_id,
                chunk_id: hit.chunk_id,
                score: hit.score,
            });
        }
        (Some(results), context, citations)
    }

    /// System prompt + summary + recent window + retrieved context.
    async fn build_prompt(
        &self,
        session: &SessionRecord,
        context: &str,
        user_text: &str,
    ) -> Result<String> {
        let messages = Sessions::messages(&self.pool, session.id).await?;
        let covered = session.summary_message_count.max(0) as usize;
        let recent: Vec<&MessageRecord> = messages
            .iter()
            .skip(covered)
            .collect();
        let window_start = recent.len().saturating_sub(self.config.history_window);

        let mut prompt = String::new();
        if let Some(system) = &session.system_prompt {
            prompt.push_str(system);
            prompt.push_str("\n\n");
        }
        if let Some(summary) = &session.summary {
            prompt.push_str("Conversation so far (summarized): ");
            prompt.push_str(summary);
            prompt.push_str("\n\n");
        }
        if !context.is_empty() {
            prompt.push_str("Relevant document excerpts:\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }
        for message in &recent[window_start..] {
            let role = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
                MessageRole::System => "System",
            };
            prompt.push_str(&format!("{role}: {}\n", message.content));
        }
        prompt.push_str(&format!("User: {user_text}\nAssistant:"));
        Ok(prompt)
    }

    #[instrument(skip(self, user_text, opts), fields(session = ?opts.session_id), err)]
    pub async fn send_message(&self, user_text: &str, opts: &ChatOptions) -> Result<ChatResponse> {
        let session = self.ensure_session(opts).await?;
        self.record_user_message(&session, user_text).await?;

        let (results, context, citations) = self.assemble_context(&session, user_text, opts).await;
        let prompt = self.build_prompt(&session, &context, user_text).await?;

        let generate_opts = GenerateOptions {
            temperature: opts.temperature.unwrap_or(session.temperature),
            ..Default::default()
        };
        let assistant_text = self.provider.generate(&prompt, &generate_opts).await?;

        let message = self
            .persist_assistant_message(&session, &assistant_text, &context, &citations)
            .await?;
        self.maybe_summarize(session.id).await?;

        let memory_updates = if opts.extract_memory {
            self.extract_memory_facts(session.id, user_text, &assistant_text).await
        } else {
            0
        };

        Ok(ChatResponse {
            session_id: session.id,
            message,
            citations,
            memory_updates,
            degraded: results.map(|r| r.degraded).unwrap_or(false),
        })
    }

    /// Streaming flavor. Returns the session id and an event stream; the
    /// assistant message (and any memory facts) persist only after the
    /// provider stream completes. Dropping the stream cancels the provider
    /// request and persists nothing.
    pub async fn stream_message(
        self: Arc<Self>,
        user_text: &str,
        opts: &ChatOptions,
    ) -> Result<(SessionId, ReceiverStream<StreamEvent>)> {
        let session = self.ensure_session(opts).await?;
        self.record_user_message(&session, user_text).await?;

        let (_, context, citations) = self.assemble_context(&session, user_text, opts).await;
        let prompt = self.build_prompt(&session, &context, user_text).await?;
        let generate_opts = GenerateOptions {
            temperature: opts.temperature.unwrap_or(session.temperature),
            ..Default::default()
        };

        let mut provider_stream = self.provider.stream(&prompt, &generate_opts).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(32);
        let orchestrator = self.clone();
        let session_id = session.id;
        let user_text = user_text.to_string();
        let extract_memory = opts.extract_memory;

        tokio::spawn(async move {
            let mut accumulated = String::new();
            let mut completed = true;

            while let Some(next) = provider_stream.next().await {
                match next {
                    Ok(token) => {
                        accumulated.push_str(&token);
                        if tx.send(StreamEvent::Token(token)).await.is_err() {
                            // Consumer abandoned the stream: stop reading and
                            // drop the provider connection without persisting.
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                        completed = false;
                        break;
                    }
                }
            }

            if completed && !accumulated.is_empty() {
                match orchestrator
                    .persist_assistant_message(&session, &accumulated, &context, &citations)
                    .await
                {
                    Ok(_) => {
                        if let Err(err) = orchestrator.maybe_summarize(session_id).await {
                            tracing::warn!(error = %err, "post-stream summarization failed");
                        }
                        if extract_memory {
                            orchestrator
                                .extract_memory_facts(session_id, &user_text, &accumulated)
                                .await;
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to persist streamed assistant message");
                    }
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok((session_id, ReceiverStream::new(rx)))
    }

    async fn record_user_message(&self, session: &SessionRecord, user_text: &str) -> Result<()> {
        Sessions::add_message(
            &self.pool,
            session.id,
            MessageRole::User,
            user_text,
            MessageType::Text,
            None,
            None,
            approx_tokens(user_text) as i64,
        )
        .await?;

        // First user message titles a fresh session.
        if session.title == "New session" {
            let title: String = user_text.split_whitespace().take(8).collect::<Vec<_>>().join(" ");
            if !title.is_empty() {
                Sessions::set_title(&self.pool, session.id, &title).await?;
            }
        }
        Ok(())
    }

    async fn persist_assistant_message(
        &self,
        session: &SessionRecord,
        assistant_text: &str,
        context: &str,
        citations: &[Citation],
    ) -> Result<MessageRecord> {
        let sources_json = if citations.is_empty() {
            None
        } else {
            Some(serde_json::to_string(citations).unwrap_or_else(|_| "[]".to_string()))
        };
        let message = Sessions::add_message(
            &self.pool,
            session.id,
            MessageRole::Assistant,
            assistant_text,
            MessageType::Text,
            (!context.is_empty()).then(|| context.to_string()).as_deref(),
            sources_json.as_deref(),
            approx_tokens(assistant_text) as i64,
        )
        .await?;
        Ok(message)
    }

    /// Summarize the oldest half of the uncovered messages once the token
    /// budget is exceeded. Rows are kept; `summary_message_count` marks how
    /// many the stored summary replaces during prompt assembly.
    async fn maybe_summarize(&self, session_id: SessionId) -> Result<()> {
        let Some(session) = Sessions::get(&self.pool, session_id).await? else {
            return Ok(());
        };
        if session.total_tokens <= session.max_context_tokens {
            return Ok(());
        }

        let messages = Sessions::messages(&self.pool, session_id).await?;
        let covered = session.summary_message_count.max(0) as usize;
        let uncovered = &messages[covered.min(messages.len())..];
        if uncovered.len() < 2 {
            return Ok(());
        }
        let take = uncovered.len().div_ceil(2);

        let mut to_summarize = String::new();
        if let Some(previous) = &session.summary {
            to_summarize.push_str(&format!("Previous summary: {previous}\n\n"));
        }
        for message in &uncovered[..take] {
            let role = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
                MessageRole::System => "System",
            };
            to_summarize.push_str(&format!("{role}: {}\n", message.content));
        }

        let prompt = format!(
            "Summarize this conversation segment in a short paragraph, keeping entities, \
             numbers, and decisions:\n\n{to_summarize}"
        );
        match self.provider.generate(&prompt, &GenerateOptions::default()).await {
            Ok(summary) => {
                Sessions::set_summary(&self.pool, session_id, summary.trim(), (covered + take) as i64)
                    .await?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "conversation summarization failed; keeping full history");
            }
        }
        Ok(())
    }

    /// Secondary provider call extracting fact triples. Failures are
    /// swallowed; memory extraction is best-effort by design.
    async fn extract_memory_facts(&self, session_id: SessionId, user_text: &str, assistant_text: &str) -> usize {
        let prompt = format!(
            "Extract durable facts from this exchange as JSON: \
             {{\"facts\": [{{\"fact_type\": \"user_preference\"|\"document_context\"|\"entity\"|\"relationship\"|\"temporal\", \
             \"key\": string, \"value\": string, \"confidence\": 0..1}}]}}. \
             Return {{\"facts\": []}} when nothing is worth remembering.\n\nUser: {user_text}\nAssistant: {assistant_text}"
        );

        let raw = match self.provider.generate(&prompt, &GenerateOptions::default()).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "memory extraction call failed");
                return 0;
            }
        };
        let Some(value) = repair_json(&raw) else {
            return 0;
        };
        let facts = value
            .get("facts")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut updated = 0;
        for fact in facts {
            let (Some(key), Some(fact_value)) = (
                fact.get("key").and_then(|v| v.as_str()),
                fact.get("value").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let fact_type = fact
                .get("fact_type")
                .and_then(|v| serde_json::from_value::<FactType>(v.clone()).ok())
                .unwrap_or(FactType::Entity);
            let upsert = MemoryFactUpsert {
                session_id: Some(session_id),
                fact_type,
                key: key.to_string(),
                value: fact_value.to_string(),
                confidence: fact
                    .get("confidence")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.5)
                    .clamp(0.0, 1.0),
            };
            if Memory::upsert(&self.pool, &upsert).await.is_ok() {
                updated += 1;
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, EmbeddingConfig, LlmConfig, SearchConfig};
    use crate::db::connect_test;
    use crate::llm::inprocess::InProcessProvider;
    use crate::search::vector::SharedVectorIndex;

    async fn orchestrator(pool: &SqlitePool) -> Arc<ChatOrchestrator> {
        let embedding = EmbeddingConfig {
            dimension: 16,
            ..Default::default()
        };
        let provider: Arc<dyn ModelProvider> =
            Arc::new(InProcessProvider::new(LlmConfig::default(), embedding));
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(SharedVectorIndex::open(dir.path().join("chunks.bin"), 16).await);
        let retriever = Arc::new(HybridRetriever::new(
            pool.clone(),
            provider.clone(),
            index,
            SearchConfig::default(),
            &CacheConfig::default(),
            &LlmConfig::default(),
        ));
        Arc::new(ChatOrchestrator::new(
            pool.clone(),
            provider,
            retriever,
            ChatConfig::default(),
        ))
    }

    #[tokio::test]
    async fn send_message_creates_session_and_persists_both_sides() {
        let pool = connect_test().await;
        let orchestrator = orchestrator(&pool).await;

        let response = orchestrator
            .send_message("what invoices mention pumps?", &ChatOptions::default())
            .await
            .unwrap();

        let messages = Sessions::messages(&pool, response.session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert!(!response.message.content.is_empty());

        // Session titled from the first user message.
        let session = Sessions::get(&pool, response.session_id).await.unwrap().unwrap();
        assert_eq!(session.title, "what invoices mention pumps?");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let pool = connect_test().await;
        let orchestrator = orchestrator(&pool).await;
        let err = orchestrator
            .send_message(
                "hi",
                &ChatOptions {
                    session_id: Some(uuid::Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn stream_completes_and_persists() {
        let pool = connect_test().await;
        let orchestrator = orchestrator(&pool).await;

        let (session_id, mut stream) = orchestrator
            .clone()
            .stream_message("stream me an answer", &ChatOptions::default())
            .await
            .unwrap();

        let mut tokens = String::new();
        let mut saw_done = false;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Token(token) => tokens.push_str(&token),
                StreamEvent::Done => {
                    saw_done = true;
                    break;
                }
                StreamEvent::Error(err) => panic!("unexpected stream error: {err}"),
            }
        }
        assert!(saw_done);
        assert!(!tokens.is_empty());

        // Persisted after completion: user + assistant.
        let messages = Sessions::messages(&pool, session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, tokens);
    }

    /// Provider that trickles tokens, so tests can abandon mid-stream.
    struct SlowStreamProvider;

    #[async_trait::async_trait]
    impl ModelProvider for SlowStreamProvider {
        fn identifier(&self) -> String {
            "slow-stream".to_string()
        }
        async fn generate(
            &self,
            _prompt: &str,
            _opts: &GenerateOptions,
        ) -> std::result::Result<String, crate::llm::LlmError> {
            Ok("unused".to_string())
        }
        async fn stream(
            &self,
            _prompt: &str,
            _opts: &GenerateOptions,
        ) -> std::result::Result<crate::llm::TextStream, crate::llm::LlmError> {
            let stream = futures::stream::unfold(0u32, |i| async move {
                if i >= 20 {
                    return None;
                }
                tokio::time::sleep(std::time::Duration::from_millis(25)).await;
                Some((Ok(format!("tok{i} ")), i + 1))
            });
            Ok(stream.boxed())
        }
        async fn embed(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, crate::llm::LlmError> {
            Ok(texts.iter().map(|_| vec![0.0; 16]).collect())
        }
        async fn check_health(&self) -> crate::llm::ProviderHealth {
            crate::llm::ProviderHealth {
                available: true,
                latency_ms: 0,
                identifier: self.identifier(),
                error: None,
            }
        }
    }

    #[tokio::test]
    async fn abandoned_stream_persists_no_assistant_message() {
        let pool = connect_test().await;
        let embedding = EmbeddingConfig {
            dimension: 16,
            ..Default::default()
        };
        let provider: Arc<dyn ModelProvider> = Arc::new(SlowStreamProvider);
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(SharedVectorIndex::open(dir.path().join("chunks.bin"), 16).await);
        let fallback_provider: Arc<dyn ModelProvider> =
            Arc::new(InProcessProvider::new(LlmConfig::default(), embedding));
        let retriever = Arc::new(HybridRetriever::new(
            pool.clone(),
            fallback_provider,
            index,
            SearchConfig::default(),
            &CacheConfig::default(),
            &LlmConfig::default(),
        ));
        let orchestrator = Arc::new(ChatOrchestrator::new(
            pool.clone(),
            provider,
            retriever,
            ChatConfig::default(),
        ));

        let (session_id, mut stream) = orchestrator
            .clone()
            .stream_message("this will be abandoned mid-flight", &ChatOptions::default())
            .await
            .unwrap();

        // Read one token then drop the stream.
        let first = stream.next().await;
        assert!(matches!(first, Some(StreamEvent::Token(_))));
        drop(stream);

        // Give the producer task a moment to observe the closed channel.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let messages = Sessions::messages(&pool, session_id).await.unwrap();
        assert_eq!(messages.len(), 1, "only the user message may persist");
        assert_eq!(messages[0].role, MessageRole::User);
        assert!(Memory::for_session(&pool, session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summarization_covers_the_oldest_half() {
        let pool = connect_test().await;
        let orchestrator = orchestrator(&pool).await;

        // Tiny token budget forces summarization immediately.
        let session = Sessions::create(&pool, Some("t"), None, 4, 0.7).await.unwrap();
        let opts = ChatOptions {
            session_id: Some(session.id),
            use_rag: false,
            ..Default::default()
        };
        orchestrator.send_message("first long message about steel rods", &opts).await.unwrap();
        orchestrator.send_message("second long message about copper pipes", &opts).await.unwrap();

        let after = Sessions::get(&pool, session.id).await.unwrap().unwrap();
        assert!(after.summary.is_some());
        assert!(after.summary_message_count > 0);
    }
}
