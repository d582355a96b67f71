//! Configuration for the retrieval pipeline.
//!
//! Configuration is read from a TOML file and can be overridden through
//! environment variables prefixed with `DOCQA_`.
//!
//! ```toml
//! [chunking]
//! chunk_size = 1800
//! overlap = 200
//!
//! [embedding]
//! provider = "openai"
//! max_concurrency = 4
//!
//! [retrieval]
//! top_k = 5
//! max_context_chars = 4000
//!
//! [store]
//! data_dir = "data/vectors"
//! ```

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const ENV_DATA_DIR: &str = "DOCQA_DATA_DIR";
pub const ENV_EMBEDDING_PROVIDER: &str = "DOCQA_EMBEDDING_PROVIDER";
pub const ENV_GENERATION_PROVIDER: &str = "DOCQA_GENERATION_PROVIDER";
pub const ENV_CHUNK_SIZE: &str = "DOCQA_CHUNK_SIZE";
pub const ENV_CHUNK_OVERLAP: &str = "DOCQA_CHUNK_OVERLAP";
pub const ENV_TOP_K: &str = "DOCQA_TOP_K";
pub const ENV_MAX_CONTEXT_CHARS: &str = "DOCQA_MAX_CONTEXT_CHARS";

const EMBEDDING_PROVIDERS: [&str; 3] = ["openai", "ollama", "mock"];
const GENERATION_PROVIDERS: [&str; 3] = ["openai", "ollama", "none"];

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1800,
            overlap: 200,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name (openai, ollama, mock)
    pub provider: String,

    /// Upper bound on concurrent per-chunk embedding calls during a build
    pub max_concurrency: usize,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    pub openai: OpenAIEmbeddingConfig,
    pub ollama: OllamaEmbeddingConfig,
    pub mock: MockEmbeddingConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            max_concurrency: 4,
            timeout_seconds: 30,
            openai: OpenAIEmbeddingConfig::default(),
            ollama: OllamaEmbeddingConfig::default(),
            mock: MockEmbeddingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIEmbeddingConfig {
    /// API key (can be set via OPENAI_API_KEY env var)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// API endpoint
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// Requested output dimension, for models that support shortening
    pub dimension: Option<usize>,
}

impl Default for OpenAIEmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaEmbeddingConfig {
    /// Ollama server URL
    pub endpoint: String,

    /// Model name
    pub model: String,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockEmbeddingConfig {
    pub dimension: usize,
}

impl Default for MockEmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

/// Generation provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Provider name (openai, ollama, none)
    pub provider: String,

    /// Sampling temperature; low values keep answers close to the context
    pub temperature: f32,

    /// Maximum tokens in the generated answer
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    pub openai: OpenAIGenerationConfig,
    pub ollama: OllamaGenerationConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            timeout_seconds: 60,
            openai: OpenAIGenerationConfig::default(),
            ollama: OllamaGenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIGenerationConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
}

impl Default for OpenAIGenerationConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaGenerationConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for OllamaGenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

/// Query-time retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Hard cap on the assembled context, in characters
    pub max_context_chars: usize,

    /// Placed between consecutive chunks in the assembled context
    pub separator: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_chars: 4000,
            separator: "\n---\n".to_string(),
        }
    }
}

/// Index persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the persisted generations
    pub data_dir: PathBuf,

    /// Number of generation directories kept on disk, the current one included
    pub keep_generations: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/vectors"),
            keep_generations: 1,
        }
    }
}

impl RagConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RagError::config(format!("Failed to parse config file: {}", e)))?;

        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration atomically (temp file, then rename).
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RagError::config(format!("Failed to serialize config: {}", e)))?;

        let temp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `DOCQA_*` environment variable overrides.
    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(data_dir) = std::env::var(ENV_DATA_DIR) {
            debug!("Overriding data_dir from environment: {}", data_dir);
            self.store.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(provider) = std::env::var(ENV_EMBEDDING_PROVIDER) {
            debug!("Overriding embedding provider from environment: {}", provider);
            self.embedding.provider = provider;
        }

        if let Ok(provider) = std::env::var(ENV_GENERATION_PROVIDER) {
            debug!("Overriding generation provider from environment: {}", provider);
            self.generation.provider = provider;
        }

        if let Some(chunk_size) = parse_env(ENV_CHUNK_SIZE)? {
            self.chunking.chunk_size = chunk_size;
        }

        if let Some(overlap) = parse_env(ENV_CHUNK_OVERLAP)? {
            self.chunking.overlap = overlap;
        }

        if let Some(top_k) = parse_env(ENV_TOP_K)? {
            self.retrieval.top_k = top_k;
        }

        if let Some(max_context_chars) = parse_env(ENV_MAX_CONTEXT_CHARS)? {
            self.retrieval.max_context_chars = max_context_chars;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(RagError::ChunkerConfig {
                chunk_size: self.chunking.chunk_size,
                overlap: self.chunking.overlap,
            });
        }

        if self.retrieval.top_k == 0 {
            return Err(RagError::config("retrieval.top_k must be at least 1"));
        }

        if self.retrieval.max_context_chars == 0 {
            return Err(RagError::config(
                "retrieval.max_context_chars must be at least 1",
            ));
        }

        if self.embedding.max_concurrency == 0 {
            return Err(RagError::config(
                "embedding.max_concurrency must be at least 1",
            ));
        }

        if self.store.keep_generations == 0 {
            return Err(RagError::config("store.keep_generations must be at least 1"));
        }

        let embedding_provider = self.embedding.provider.to_lowercase();
        if !EMBEDDING_PROVIDERS.contains(&embedding_provider.as_str()) {
            return Err(RagError::config(format!(
                "Invalid embedding provider '{}'. Must be one of: {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        let generation_provider = self.generation.provider.to_lowercase();
        if !GENERATION_PROVIDERS.contains(&generation_provider.as_str()) {
            return Err(RagError::config(format!(
                "Invalid generation provider '{}'. Must be one of: {}",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }

        if embedding_provider == "mock" && self.embedding.mock.dimension == 0 {
            return Err(RagError::config("embedding.mock.dimension must be at least 1"));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw.trim().parse::<T>().map_err(|_| {
                RagError::config(format!("Invalid value '{}' for {}", raw, name))
            })?;
            debug!("Overriding {} from environment: {}", name, raw);
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.chunking.chunk_size, 1800);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_context_chars, 4000);
        assert_eq!(config.retrieval.separator, "\n---\n");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut config = RagConfig::default();
        config.chunking.overlap = config.chunking.chunk_size;

        match config.validate() {
            Err(RagError::ChunkerConfig { chunk_size, overlap }) => {
                assert_eq!(chunk_size, 1800);
                assert_eq!(overlap, 1800);
            }
            other => panic!("Expected ChunkerConfig error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = RagConfig::default();
        config.embedding.provider = "gemini".to_string();
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RagConfig = toml::from_str(
            r#"
            [chunking]
            chunk_size = 500

            [embedding]
            provider = "mock"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.embedding.provider, "mock");
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("docqa.toml");

        let mut config = RagConfig::default();
        config.embedding.provider = "mock".to_string();
        config.generation.provider = "none".to_string();
        config.retrieval.top_k = 3;
        config.store.data_dir = temp_dir.path().join("vectors");

        config.save_to_path(&path).await.unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = RagConfig::load_from_path(&path).await.unwrap();
        assert_eq!(loaded.retrieval.top_k, 3);
        assert_eq!(loaded.embedding.provider, "mock");
        assert_eq!(loaded.store.data_dir, temp_dir.path().join("vectors"));
    }
}
