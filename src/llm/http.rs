//! HTTP-backed model provider for local OpenAI-style servers.
//!
//! Speaks `/v1/chat/completions` (plain and SSE streaming), `/v1/embeddings`,
//! and probes `/v1/models` for health. Every outbound call goes through the
//! circuit breaker; timeouts retry with exponential backoff, semantic
//! failures do not.

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::llm::breaker::CircuitBreaker;
use crate::llm::{GenerateOptions, LlmError, ModelProvider, ProviderHealth, TextStream, l2_normalize};
use base64::Engine;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;

pub struct HttpProvider {
    client: reqwest::Client,
    llm: LlmConfig,
    embedding: EmbeddingConfig,
    breaker: CircuitBreaker,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatDeltaFrame {
    choices: Vec<ChatDeltaChoice>,
}

#[derive(Deserialize)]
struct ChatDeltaChoice {
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpProvider {
    pub fn new(llm: LlmConfig, embedding: EmbeddingConfig) -> Self {
        let breaker = CircuitBreaker::new(llm.failure_threshold, llm.cooldown_duration());
        Self {
            client: reqwest::Client::new(),
            llm,
            embedding,
            breaker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.llm.host.trim_end_matches('/'), path)
    }

    fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout { seconds: timeout_secs }
        } else {
            LlmError::Unavailable {
                message: err.to_string(),
            }
        }
    }

    /// Breaker + timeout + retry wrapper. Timeouts retry with exponential
    /// backoff; other failures return immediately (recording against the
    /// breaker when trippable).
    async fn call_guarded<T, F, Fut>(&self, op: F) -> Result<T, LlmError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let timeout = self.llm.timeout_duration();
        let mut delay = Duration::from_secs_f64(self.llm.retry_delay.max(0.0));

        for attempt in 0..=self.llm.max_retries {
            self.breaker.try_acquire()?;

            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    seconds: self.llm.timeout,
                }),
            };

            match outcome {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err @ LlmError::Timeout { .. }) => {
                    self.breaker.record_failure();
                    if attempt == self.llm.max_retries {
                        return Err(err);
                    }
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "provider call timed out; retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.llm.retry_multiplier.max(1.0));
                }
                Err(err) => {
                    if err.trips_breaker() {
                        self.breaker.record_failure();
                    }
                    return Err(err);
                }
            }
        }
        Err(LlmError::Timeout {
            seconds: self.llm.timeout,
        })
    }

    fn chat_body(&self, prompt: &str, opts: &GenerateOptions, stream: bool) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &opts.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": self.llm.model_name,
            "messages": messages,
            "temperature": opts.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = opts.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    async fn post_chat(&self, body: &serde_json::Value) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.url("/v1/chat/completions"))
            .json(body)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(e, self.llm.timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::Unavailable {
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(LlmError::Unavailable {
                message: format!("HTTP {status}: {text}"),
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
                message: format!("chat completion decode failed: {e}"),
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "chat completion had no content".to_string(),
            })
    }
}

/// Extract delta text from one SSE payload line.
fn parse_delta(payload: &str) -> Option<String> {
    serde_json::from_str::<ChatDeltaFrame>(payload)
        .ok()
        .and_then(|frame| frame.choices.into_iter().next())
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}

#[async_trait::async_trait]
impl ModelProvider for HttpProvider {
    fn identifier(&self) -> String {
        self.llm.model_name.clone()
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, LlmError> {
        let body = self.chat_body(prompt, opts, false);
        self.call_guarded(|| self.post_chat(&body)).await
    }

    async fn stream(&self, prompt: &str, opts: &GenerateOptions) -> Result<TextStream, LlmError> {
        let body = self.chat_body(prompt, opts, true);
        let url = self.url("/v1/chat/completions");
        let timeout_secs = self.llm.timeout;

        // Resilience applies to establishing the stream; mid-stream failures
        // surface in-band so consumers can emit [ERROR].
        let response = self
            .call_guarded(|| async {
                let response = self
                    .client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| Self::map_transport_error(e, timeout_secs))?;
                if !response.status().is_success() {
                    return Err(LlmError::Unavailable {
                        message: format!("HTTP {}", response.status()),
                    });
                }
                Ok(response)
            })
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, LlmError>>(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            'read: while let Some(next) = bytes.next().await {
                match next {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        while let Some(newline) = buffer.find('\n') {
                            let line = buffer[..newline].trim().to_string();
                            buffer.drain(..=newline);
                            let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                                continue;
                            };
                            if payload == "[DONE]" {
                                break 'read;
                            }
                            if let Some(content) = parse_delta(payload) {
                                // Receiver dropped means the consumer abandoned
                                // the stream; stop reading and let the response
                                // drop, which closes the connection.
                                if tx.send(Ok(content)).await.is_err() {
                                    break 'read;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx
                            .send(Err(LlmError::Unavailable {
                                message: err.to_string(),
                            }))
                            .await;
                        break 'read;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embedding.batch_size.max(1)) {
            let body = json!({
                "model": self.embedding.model_name,
                "input": batch,
            });
            let vectors = self
                .call_guarded(|| async {
                    let response = self
                        .client
                        .post(self.url("/v1/embeddings"))
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| Self::map_transport_error(e, self.llm.timeout))?;
                    let status = response.status();
                    let text = response.text().await.map_err(|e| LlmError::Unavailable {
                        message: e.to_string(),
                    })?;
                    if !status.is_success() {
                        return Err(LlmError::Unavailable {
                            message: format!("HTTP {status}: {text}"),
                        });
                    }
                    let parsed: EmbeddingResponse =
                        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
                            message: format!("embedding decode failed: {e}"),
                        })?;
                    let mut rows = parsed.data;
                    rows.sort_by_key(|row| row.index);
                    Ok(rows.into_iter().map(|row| row.embedding).collect::<Vec<_>>())
                })
                .await?;

            if vectors.len() != batch.len() {
                return Err(LlmError::InvalidResponse {
                    message: format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                });
            }
            for mut vector in vectors {
                if vector.len() != self.embedding.dimension {
                    return Err(LlmError::InvalidResponse {
                        message: format!(
                            "embedding dimension mismatch: expected {}, got {}",
                            self.embedding.dimension,
                            vector.len()
                        ),
                    });
                }
                if self.embedding.normalize {
                    l2_normalize(&mut vector);
                }
                all.push(vector);
            }
        }
        Ok(all)
    }

    async fn check_health(&self) -> ProviderHealth {
        let started = Instant::now();
        let result = self
            .call_guarded(|| async {
                let response = self
                    .client
                    .get(self.url("/v1/models"))
                    .send()
                    .await
                    .map_err(|e| Self::map_transport_error(e, self.llm.timeout))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(LlmError::Unavailable {
                        message: format!("HTTP {}", response.status()),
                    })
                }
            })
            .await;

        ProviderHealth {
            available: result.is_ok(),
            latency_ms: started.elapsed().as_millis() as u64,
            identifier: self.identifier(),
            error: result.err().map(|e| e.to_string()),
        }
    }

    async fn caption(&self, image: &[u8], prompt: &str) -> Result<String, LlmError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let body = json!({
            "model": self.llm.model_name,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{encoded}")}}
                ]
            }],
            "temperature": 0.0,
        });
        self.call_guarded(|| self.post_chat(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> HttpProvider {
        let llm = LlmConfig {
            host: server.uri(),
            failure_threshold: 3,
            max_retries: 0,
            timeout: 5,
            ..Default::default()
        };
        let embedding = EmbeddingConfig {
            dimension: 3,
            ..Default::default()
        };
        HttpProvider::new(llm, embedding)
    }

    #[tokio::test]
    async fn generate_extracts_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let text = provider.generate("hi", &GenerateOptions::default()).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn embeddings_are_normalized_and_ordered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 2.0, 0.0]},
                    {"index": 0, "embedding": [3.0, 0.0, 4.0]}
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let vectors = provider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        // index 0 first, normalized from [3,0,4]
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][2] - 0.8).abs() < 1e-6);
        assert!((vectors[1][1] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        for _ in 0..3 {
            let err = provider.generate("x", &GenerateOptions::default()).await.unwrap_err();
            assert!(matches!(err, LlmError::Unavailable { .. }));
        }

        // Fourth call never reaches the server: the mock's expect(3) would
        // fail on drop otherwise.
        let err = provider.generate("x", &GenerateOptions::default()).await.unwrap_err();
        assert!(matches!(err, LlmError::CircuitOpen));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0, 2.0]}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.embed(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn delta_parsing_skips_empty_frames() {
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"content":"to"}}]}"#),
            Some("to".to_string())
        );
        assert_eq!(parse_delta(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(parse_delta("not json"), None);
    }
}
