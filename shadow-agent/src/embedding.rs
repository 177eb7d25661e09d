//! Embedding providers.
//!
//! The engine treats embedding as a black-box function text → vector.
//! Every provider is versioned by model id; vectors from different model
//! versions must never be compared, and the store implementations enforce
//! that at search time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;

/// Error types for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider is not reachable
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Request failed
    #[error("Embedding request failed: {0}")]
    RequestFailed(String),

    /// Provider returned an unexpected payload
    #[error("Embedding parse error: {0}")]
    ParseError(String),

    /// Returned vector has the wrong dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers.
///
/// Deterministic per model version; no side effects.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier, persisted alongside every vector.
    fn model_id(&self) -> &str;

    /// Fixed output dimension of this model.
    fn dimension(&self) -> usize;

    /// Embed a text into a vector of `dimension()` components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// OpenAI-compatible `/embeddings` endpoint client.
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OpenAiEmbeddings {
    /// Create a new embeddings client.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .build()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            dimension,
            timeout: Duration::from_secs(10),
        })
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RequestFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ParseError(e.to_string()))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::ParseError("empty embeddings data".to_string()))?;

        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        debug!(model = %self.model, chars = text.len(), "Embedded text");
        Ok(vector)
    }
}

/// Deterministic mock embedding provider for tests.
///
/// Hashes character n-grams into a fixed-dimension vector, so identical
/// texts always embed identically and similar texts land nearby.
pub struct MockEmbeddings {
    model_id: String,
    dimension: usize,
}

impl MockEmbeddings {
    /// Create a mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: "mock-embed-v1".to_string(),
            dimension,
        }
    }

    /// Override the model id (to simulate version changes).
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddings {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let bytes = lowered.as_bytes();

        for window in bytes.windows(3) {
            let mut hash: u64 = 1469598103934665603;
            for b in window {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let slot = (hash % self.dimension as u64) as usize;
            vector[slot] += 1.0;
        }

        // L2-normalize so cosine similarity behaves
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}
