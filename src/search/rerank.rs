//! Cross-encoder reranking over the provider host's `/v1/rerank` endpoint.
//!
//! Scores `(query, document)` pairs jointly. More accurate than bi-encoder
//! retrieval and proportionally more expensive, so it only runs over the
//! merged candidate set when enabled. Failures are soft: the retriever
//! keeps the pre-rerank ordering and marks the response `reranked = false`.

use crate::config::LlmConfig;
use crate::llm::LlmError;
use serde::Deserialize;
use serde_json::json;

pub struct Reranker {
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: std::time::Duration,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankRow>,
}

#[derive(Deserialize)]
struct RerankRow {
    index: usize,
    relevance_score: f64,
}

impl Reranker {
    pub fn new(llm: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: llm.host.trim_end_matches('/').to_string(),
            model: llm.model_name.clone(),
            timeout: llm.timeout_duration(),
        }
    }

    /// Relevance score per document, positionally aligned with the input.
    pub async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, LlmError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        });

        let send = self
            .client
            .post(format!("{}/v1/rerank", self.host))
            .json(&body)
            .send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| LlmError::Unavailable {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Unavailable {
                message: format!("HTTP {}", response.status()),
            });
        }

        let parsed: RerankResponse = response.json().await.map_err(|e| LlmError::InvalidResponse {
            message: format!("rerank decode failed: {e}"),
        })?;

        let mut scores = vec![0.0; documents.len()];
        for row in parsed.results {
            if row.index < scores.len() {
                scores[row.index] = row.relevance_score;
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn scores_align_positionally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"index": 1, "relevance_score": 0.9},
                    {"index": 0, "relevance_score": 0.2}
                ]
            })))
            .mount(&server)
            .await;

        let reranker = Reranker::new(&LlmConfig {
            host: server.uri(),
            ..Default::default()
        });
        let scores = reranker
            .score("pump", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.2, 0.9]);
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rerank"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let reranker = Reranker::new(&LlmConfig {
            host: server.uri(),
            ..Default::default()
        });
        let err = reranker.score("q", &["d".to_string()]).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }));
    }
}
