//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` but can be specified
//! via the `-f` flag or the `SRG_CONFIG` environment variable.
//!
//! ## Loading priority
//!
//! 1. **YAML config file** — base configuration
//! 2. **Environment variables** — each config section has a dedicated prefix
//!    that maps onto its fields:
//!
//! ```bash
//! LLM_PROVIDER=http LLM_MODEL_NAME=qwen2.5 LLM_HOST=http://localhost:11434
//! LLM_TIMEOUT=120 LLM_FAILURE_THRESHOLD=3 LLM_COOLDOWN_SECONDS=60
//! EMBED_MODEL_NAME=bge-m3 EMBED_DIMENSION=1024 EMBED_BATCH_SIZE=32
//! SEARCH_FAISS_CANDIDATES=60 SEARCH_FTS_CANDIDATES=60 SEARCH_CHUNK_SIZE=512
//! CACHE_SEARCH_CACHE_SIZE=1000 CACHE_SEARCH_CACHE_TTL=300
//! STORAGE_POOL_SIZE=5 STORAGE_BUSY_TIMEOUT=30
//! SRG_HOST=0.0.0.0 SRG_PORT=8600
//! ```

use crate::errors::Error;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SRG_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub chat: ChatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8600,
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

/// Embedded store and on-disk layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root data directory; all persisted state lives underneath it
    pub data_dir: PathBuf,
    /// Connection pool size
    pub pool_size: u32,
    /// Busy timeout absorbing writer contention, in seconds
    pub busy_timeout: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            pool_size: 5,
            busy_timeout: 30,
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("srg.db")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn vision_cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache").join("vision")
    }

    pub fn chunks_index_path(&self) -> PathBuf {
        self.data_dir.join("faiss_chunks.bin")
    }

    pub fn items_index_path(&self) -> PathBuf {
        self.data_dir.join("faiss_items.bin")
    }

    pub fn busy_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.busy_timeout)
    }
}

/// Model provider selection and resilience knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider kind: "http" (local OpenAI-style server) or "inprocess"
    pub provider: String,
    pub model_name: String,
    /// Base URL of the local model server
    pub host: String,
    /// Per-call timeout in seconds
    pub timeout: u64,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe
    pub cooldown_seconds: u64,
    /// Retry attempts on timeout
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay: f64,
    /// Backoff multiplier applied per attempt
    pub retry_multiplier: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            model_name: "qwen2.5:7b".to_string(),
            host: "http://localhost:11434".to_string(),
            timeout: 120,
            failure_threshold: 3,
            cooldown_seconds: 60,
            max_retries: 2,
            retry_delay: 1.0,
            retry_multiplier: 2.0,
        }
    }
}

impl LlmConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    pub model_name: String,
    /// Vector dimension; the index file records and enforces it
    pub dimension: usize,
    pub batch_size: usize,
    /// L2-normalize embeddings so inner product equals cosine similarity
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "bge-m3".to_string(),
            dimension: 1024,
            batch_size: 32,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Reciprocal rank fusion constant. Frozen at 60; config loading rejects
    /// any other value so result ordering stays comparable across deployments.
    pub rrf_k: u32,
    /// Vector-index candidate count per query
    pub faiss_candidates: usize,
    /// Lexical candidate count per query
    pub fts_candidates: usize,
    pub reranker_enabled: bool,
    pub reranker_top_k: usize,
    /// Chunk window in tokens
    pub chunk_size: usize,
    /// Chunk overlap in tokens
    pub chunk_overlap: usize,
    /// Shared deadline for the vector and lexical sub-queries, in seconds
    pub query_timeout: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            faiss_candidates: 60,
            fts_candidates: 60,
            reranker_enabled: false,
            reranker_top_k: 10,
            chunk_size: 512,
            chunk_overlap: 50,
            query_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Bounded entry count for the search result cache
    pub search_cache_size: u64,
    /// TTL for cached results, in seconds
    pub search_cache_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_cache_size: 1000,
            search_cache_ttl: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Default retrieval depth for RAG context
    pub default_top_k: usize,
    /// Default context character budget
    pub default_max_context_length: usize,
    /// Token budget before the oldest half of a session is summarized
    pub default_max_context_tokens: i64,
    pub default_temperature: f64,
    /// Recent messages included verbatim in prompt assembly
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            default_max_context_length: 4000,
            default_max_context_tokens: 4096,
            default_temperature: 0.7,
            history_window: 10,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(args: &Args) -> Result<Self, Error> {
        let mut figment = Figment::new().merge(Yaml::file(&args.config));

        // Section prefixes map the documented environment variables onto the
        // nested config keys: LLM_MODEL_NAME -> llm.model_name, etc.
        for (prefix, section) in [
            ("LLM_", "llm"),
            ("EMBED_", "embedding"),
            ("SEARCH_", "search"),
            ("CACHE_", "cache"),
            ("STORAGE_", "storage"),
        ] {
            let section = section.to_string();
            figment = figment.merge(
                Env::prefixed(prefix).map(move |key| format!("{section}.{}", key.as_str().to_ascii_lowercase()).into()),
            );
        }

        // Server-level overrides: SRG_HOST / SRG_PORT.
        let figment = figment.merge(Env::prefixed("SRG_").only(&["host", "port"]));

        let config: Config = figment.extract().map_err(|e| Error::Config {
            message: format!("failed to load configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that violate frozen contracts.
    pub fn validate(&self) -> Result<(), Error> {
        if self.search.rrf_k != 60 {
            return Err(Error::Config {
                message: format!("search.rrf_k is frozen at 60 (got {})", self.search.rrf_k),
            });
        }
        if self.search.chunk_overlap >= self.search.chunk_size {
            return Err(Error::Config {
                message: format!(
                    "search.chunk_overlap ({}) must be smaller than search.chunk_size ({})",
                    self.search.chunk_overlap, self.search.chunk_size
                ),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config {
                message: "embedding.dimension must be positive".to_string(),
            });
        }
        if self.storage.pool_size == 0 {
            return Err(Error::Config {
                message: "storage.pool_size must be positive".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.chat.default_temperature) {
            return Err(Error::Config {
                message: format!(
                    "chat.default_temperature must be in [0, 2] (got {})",
                    self.chat.default_temperature
                ),
            });
        }
        match self.llm.provider.as_str() {
            "http" | "inprocess" => {}
            other => {
                return Err(Error::Config {
                    message: format!("llm.provider must be \"http\" or \"inprocess\" (got \"{other}\")"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().expect("default config valid");
    }

    #[test]
    fn rrf_k_is_frozen() {
        let mut config = Config::default();
        config.search.rrf_k = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_fit_in_chunk() {
        let mut config = Config::default();
        config.search.chunk_overlap = config.search.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let mut config = Config::default();
        config.llm.provider = "cloud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_paths_derive_from_data_dir() {
        let storage = StorageConfig::default();
        assert!(storage.db_path().ends_with("srg.db"));
        assert!(storage.chunks_index_path().ends_with("faiss_chunks.bin"));
        assert!(storage.items_index_path().ends_with("faiss_items.bin"));
    }
}
