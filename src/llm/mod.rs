//! Process-wide model provider abstraction.
//!
//! A single capability set — generate, stream, embed, health, optional
//! vision captioning — behind [`ModelProvider`]. Concrete providers:
//!
//! - [`http::HttpProvider`]: a local OpenAI-style HTTP server (chat
//!   completions + embeddings), wrapped in the circuit breaker and the
//!   timeout/retry policy.
//! - [`inprocess::InProcessProvider`]: deterministic in-process fallback
//!   used for tests and offline operation.
//!
//! Selection is configuration-driven and fixed at startup.

pub mod breaker;
pub mod http;
pub mod inprocess;

use crate::config::{EmbeddingConfig, LlmConfig};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport-level failure or provider not reachable
    #[error("Model provider unavailable: {message}")]
    Unavailable { message: String },

    /// The call exceeded its deadline
    #[error("Model provider timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Failing fast while the breaker cools down
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// The provider answered, but not in a shape we can use
    #[error("Unparseable provider response: {message}")]
    InvalidResponse { message: String },

    /// Capability not offered by the configured provider
    #[error("Provider does not support {capability}")]
    Unsupported { capability: &'static str },
}

impl LlmError {
    /// Failures that count against the circuit breaker: timeouts, transport
    /// errors, and unparseable responses. Semantic refusals do not.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            LlmError::Unavailable { .. } | LlmError::Timeout { .. } | LlmError::InvalidResponse { .. }
        )
    }
}

/// Generation options shared by `generate` and `stream`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub system: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            system: None,
        }
    }
}

/// Health probe outcome for the provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderHealth {
    pub available: bool,
    pub latency_ms: u64,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A lazy finite sequence of generated text fragments.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Model identifier reported in health checks and audit results.
    fn identifier(&self) -> String;

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, LlmError>;

    /// Streaming generation. The returned stream ends when the provider is
    /// done; dropping it releases the underlying connection.
    async fn stream(&self, prompt: &str, opts: &GenerateOptions) -> Result<TextStream, LlmError>;

    /// Embed a batch of texts. Outputs are L2-normalized when the embedding
    /// config requests it (the vector index assumes cosine via inner
    /// product).
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors.pop().ok_or_else(|| LlmError::InvalidResponse {
            message: "embedding batch returned no vectors".to_string(),
        })
    }

    async fn check_health(&self) -> ProviderHealth;

    /// Describe an image. Default: unsupported.
    async fn caption(&self, _image: &[u8], _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Unsupported { capability: "vision" })
    }
}

/// Build the configured provider.
pub fn build_provider(llm: &LlmConfig, embedding: &EmbeddingConfig) -> Arc<dyn ModelProvider> {
    match llm.provider.as_str() {
        "inprocess" => Arc::new(inprocess::InProcessProvider::new(llm.clone(), embedding.clone())),
        _ => Arc::new(http::HttpProvider::new(llm.clone(), embedding.clone())),
    }
}

/// Scale a vector to unit L2 norm. Zero vectors pass through unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_vectors_have_unit_norm() {
        let mut vector = vec![3.0_f32, 4.0, 0.0];
        l2_normalize(&mut vector);
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut vector = vec![0.0_f32; 8];
        l2_normalize(&mut vector);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn semantic_errors_do_not_trip_the_breaker() {
        assert!(LlmError::Timeout { seconds: 5 }.trips_breaker());
        assert!(
            LlmError::Unavailable {
                message: "refused".into()
            }
            .trips_breaker()
        );
        assert!(!LlmError::Unsupported { capability: "vision" }.trips_breaker());
        assert!(!LlmError::CircuitOpen.trips_breaker());
    }
}
