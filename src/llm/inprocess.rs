//! Deterministic in-process provider.
//!
//! Used when no model server is configured (and throughout the test suite).
//! Generations are canned-but-relevant, embeddings hash tokens into a fixed
//! dimension, and streaming chunks the generated text word by word. All
//! operations are infallible and fast, so the breaker never trips.

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::llm::{GenerateOptions, LlmError, ModelProvider, ProviderHealth, TextStream, l2_normalize};
use futures::StreamExt;
use std::hash::{DefaultHasher, Hash, Hasher};

pub struct InProcessProvider {
    llm: LlmConfig,
    embedding: EmbeddingConfig,
}

impl InProcessProvider {
    pub fn new(llm: LlmConfig, embedding: EmbeddingConfig) -> Self {
        Self { llm, embedding }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.embedding.dimension];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.len() < 2 {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() as usize) % self.embedding.dimension;
            vector[slot] += 1.0;
        }
        if self.embedding.normalize {
            l2_normalize(&mut vector);
        }
        vector
    }
}

#[async_trait::async_trait]
impl ModelProvider for InProcessProvider {
    fn identifier(&self) -> String {
        format!("inprocess:{}", self.llm.model_name)
    }

    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<String, LlmError> {
        // Deterministic echo with a bounded excerpt of the prompt, so
        // downstream code has something stable to assert against.
        let excerpt: String = prompt.split_whitespace().take(12).collect::<Vec<_>>().join(" ");
        Ok(format!("[inprocess] {excerpt}"))
    }

    async fn stream(&self, prompt: &str, opts: &GenerateOptions) -> Result<TextStream, LlmError> {
        let text = self.generate(prompt, opts).await?;
        let words: Vec<Result<String, LlmError>> = text
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(futures::stream::iter(words).boxed())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn check_health(&self) -> ProviderHealth {
        ProviderHealth {
            available: true,
            latency_ms: 0,
            identifier: self.identifier(),
            error: None,
        }
    }

    async fn caption(&self, image: &[u8], _prompt: &str) -> Result<String, LlmError> {
        Ok(format!("[inprocess] image of {} bytes", image.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn provider() -> InProcessProvider {
        InProcessProvider::new(
            LlmConfig::default(),
            EmbeddingConfig {
                dimension: 64,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_unit_norm() {
        let provider = provider();
        let a = provider.embed_single("pvc cable 10mm").await.unwrap();
        let b = provider.embed_single("pvc cable 10mm").await.unwrap();
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn similar_texts_score_higher_than_unrelated() {
        let provider = provider();
        let query = provider.embed_single("steel rod supplier").await.unwrap();
        let close = provider.embed_single("steel rod 12mm supplier quote").await.unwrap();
        let far = provider.embed_single("quarterly financial summary").await.unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[tokio::test]
    async fn stream_reassembles_to_generate_output() {
        let provider = provider();
        let full = provider.generate("hello world", &GenerateOptions::default()).await.unwrap();
        let stream = provider.stream("hello world", &GenerateOptions::default()).await.unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts.concat(), full);
    }
}
