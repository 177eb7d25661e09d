//! Vector store clients.
//!
//! The store holds (id, vector, payload) triples and answers nearest-neighbor
//! searches with optional structured filters over payload fields. Its
//! internal indexing is out of scope; this module only fixes the contract
//! the engine requires plus two implementations: a Qdrant-style HTTP client
//! and an in-memory store for tests.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use casefile::{Case, FieldValue, FilterPredicate};

pub use http::QdrantStore;
pub use memory::MemoryStore;

/// Error types for vector store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store is not reachable; retryable by the caller
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected the request
    #[error("Vector store request failed: {0}")]
    RequestFailed(String),

    /// Store returned an unexpected payload
    #[error("Vector store response invalid: {0}")]
    InvalidResponse(String),

    /// Query vector was produced by a different embedding model than the
    /// stored vectors
    #[error("Embedding model mismatch: store holds '{stored}', query used '{requested}'")]
    ModelMismatch { stored: String, requested: String },
}

/// A stored case: vector plus payload, tagged with the embedding model that
/// produced the vector.
#[derive(Debug, Clone)]
pub struct CasePoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub case: Case,
}

/// A raw search hit before the retriever post-processes it.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub case: Case,
}

/// Contract the engine requires from a vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a case point.
    async fn upsert(&self, point: CasePoint) -> Result<(), StoreError>;

    /// Nearest-neighbor search constrained to vectors of `model_id`, with
    /// optional payload filters, returning up to `limit` ranked hits.
    async fn search(
        &self,
        vector: &[f32],
        model_id: &str,
        filters: &[FilterPredicate],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Metadata-only retrieval: filter matches without a query vector.
    async fn scroll(&self, filters: &[FilterPredicate], limit: usize)
        -> Result<Vec<Case>, StoreError>;
}

/// Payload key holding the case identifier.
pub(crate) const PAYLOAD_CASE_ID: &str = "case_id";
/// Payload key holding the free-text rendering.
pub(crate) const PAYLOAD_TEXT: &str = "text";
/// Payload key holding the embedding model id.
pub(crate) const PAYLOAD_MODEL: &str = "embedding_model";

/// Flatten a case into a store payload object.
pub(crate) fn payload_from_case(case: &Case, model_id: &str) -> Value {
    let mut payload = Map::new();
    payload.insert(PAYLOAD_CASE_ID.to_string(), Value::String(case.id.clone()));
    payload.insert(PAYLOAD_TEXT.to_string(), Value::String(case.text.clone()));
    payload.insert(PAYLOAD_MODEL.to_string(), Value::String(model_id.to_string()));
    for (name, value) in &case.fields {
        let json = match value {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => serde_json::json!(n),
            FieldValue::Text(s) => Value::String(s.clone()),
        };
        payload.insert(name.clone(), json);
    }
    Value::Object(payload)
}

/// Rebuild a case from a store payload object.
pub(crate) fn case_from_payload(payload: &Value) -> Result<Case, StoreError> {
    let object = payload
        .as_object()
        .ok_or_else(|| StoreError::InvalidResponse("payload is not an object".to_string()))?;

    let id = object
        .get(PAYLOAD_CASE_ID)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidResponse("payload missing case_id".to_string()))?
        .to_string();
    let text = object
        .get(PAYLOAD_TEXT)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut case = Case::new(id, text);
    for (name, value) in object {
        if name == PAYLOAD_CASE_ID || name == PAYLOAD_TEXT || name == PAYLOAD_MODEL {
            continue;
        }
        let field = match value {
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => FieldValue::Number(f),
                None => continue,
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            _ => continue,
        };
        case.fields.insert(name.clone(), field);
    }
    Ok(case)
}
