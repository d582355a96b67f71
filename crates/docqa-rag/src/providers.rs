//! Embedding providers for generating vector embeddings.
//!
//! Every provider upholds the same contract: one text in, one non-empty
//! vector out, exactly as long as the provider returned it. Transport and
//! response-shape failures surface as [`RagError::Embedding`] carrying the
//! provider's message.

use crate::config::{EmbeddingConfig, OllamaEmbeddingConfig, OpenAIEmbeddingConfig};
use crate::error::{RagError, Result};
use crate::types::{normalize, EmbeddingModel, Vector};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vector>;

    /// Get the embedding model information.
    fn model(&self) -> &EmbeddingModel;
}

/// Create the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let timeout = Duration::from_secs(config.timeout_seconds);

    match config.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::new(config.openai.clone(), timeout)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.ollama.clone(), timeout)?)),
        "mock" => Ok(Arc::new(MockProvider::new(config.mock.dimension))),
        other => Err(RagError::config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Enforce the adapter contract on a raw provider vector.
fn check_vector(vector: Vector, expected: Option<usize>) -> Result<Vector> {
    if vector.is_empty() {
        return Err(RagError::embedding("provider returned an empty embedding"));
    }

    if !vector.iter().all(|x| x.is_finite()) {
        return Err(RagError::embedding("provider returned a non-finite value"));
    }

    if let Some(expected) = expected {
        if vector.len() != expected {
            return Err(RagError::embedding(format!(
                "provider returned {} dimensions, model declares {}",
                vector.len(),
                expected
            )));
        }
    }

    Ok(vector)
}

/// HTTP client with a request timeout and an optional bearer token.
pub(crate) fn http_client(timeout: Duration, bearer: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);

    if let Some(api_key) = bearer {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = format!("Bearer {}", api_key)
            .parse()
            .map_err(|_| RagError::config("API key contains invalid header characters"))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| RagError::config(format!("Failed to build HTTP client: {}", e)))
}

/// OpenAI-compatible embedding provider.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIEmbeddingConfig,
    model: EmbeddingModel,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIEmbeddingConfig, timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| RagError::config("OpenAI API key not configured"))?;

        let client = http_client(timeout, Some(&api_key))?;

        let dimension = config.dimension.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
            _ => 0,
        });

        let model = EmbeddingModel::new("openai", &config.model, dimension);

        info!("Initialized OpenAI embedding provider with model: {}", config.model);

        Ok(Self {
            client,
            config,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, text: &str) -> Result<Vector> {
        debug!("Generating embedding with OpenAI ({} chars)", text.len());

        let request = OpenAIRequest {
            input: text,
            model: &self.config.model,
            dimensions: self.config.dimension,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::embedding(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| RagError::embedding(format!("Malformed OpenAI response: {}", e)))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| RagError::embedding("OpenAI response contained no embeddings"))?;

        let expected = (self.model.dimension > 0).then_some(self.model.dimension);
        check_vector(embedding, expected)
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

/// Ollama embedding provider for local models.
pub struct OllamaProvider {
    client: Client,
    config: OllamaEmbeddingConfig,
    model: EmbeddingModel,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaProvider {
    pub fn new(config: OllamaEmbeddingConfig, timeout: Duration) -> Result<Self> {
        let client = http_client(timeout, None)?;
        let model = EmbeddingModel::ollama(&config.model);

        info!("Initialized Ollama embedding provider with model: {}", config.model);

        Ok(Self {
            client,
            config,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vector> {
        debug!("Generating embedding with Ollama");

        let request = OllamaRequest {
            model: &self.config.model,
            prompt: text,
        };

        let url = format!("{}/api/embeddings", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::embedding(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| RagError::embedding(format!("Malformed Ollama response: {}", e)))?;

        check_vector(response.embedding, None)
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

/// Deterministic provider for offline runs and tests.
///
/// Vectors are derived from a hash of the text, so identical texts embed
/// identically, but they carry no semantic meaning.
pub struct MockProvider {
    model: EmbeddingModel,
    dimension: usize,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: EmbeddingModel::new("mock", "mock-model", dimension),
            dimension,
        }
    }

    fn generate_embedding(&self, text: &str) -> Vector {
        let hash = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

        let mut embedding = vec![0.0; self.dimension];
        for (i, val) in embedding.iter_mut().enumerate() {
            // splitmix64 finaliser, so nearby hashes give unrelated vectors
            let mut seed = hash ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            seed = (seed ^ (seed >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            seed = (seed ^ (seed >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            seed ^= seed >> 31;
            *val = ((seed % 1000) as f32 / 1000.0) - 0.5;
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vector> {
        check_vector(self.generate_embedding(text), Some(self.dimension))
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}
