//! Chat and session API shapes.

use crate::types::SessionId;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    #[schema(value_type = Option<uuid::Uuid>)]
    pub session_id: Option<SessionId>,
    #[serde(default = "default_true")]
    pub use_rag: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_length")]
    pub max_context_length: usize,
    #[serde(default)]
    pub extract_memory: bool,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    5
}

fn default_context_length() -> usize {
    4000
}

impl ChatRequest {
    pub fn to_options(&self) -> crate::chat::ChatOptions {
        crate::chat::ChatOptions {
            session_id: self.session_id,
            use_rag: self.use_rag,
            top_k: self.top_k.clamp(1, 20),
            max_context_length: self.max_context_length.clamp(500, 16_000),
            extract_memory: self.extract_memory,
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature.map(|t| t.clamp(0.0, 2.0)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SessionCreateRequest {
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub max_context_tokens: Option<i64>,
    pub temperature: Option<f64>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct SessionSummaryResponse {
    #[schema(value_type = uuid::Uuid)]
    pub session_id: SessionId,
    pub summary: Option<String>,
    pub summary_message_count: i64,
    pub total_tokens: i64,
    pub max_context_tokens: i64,
}
