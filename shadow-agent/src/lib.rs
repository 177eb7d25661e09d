//! Shadow Agent - external AI service clients
//!
//! Provides the infrastructure the Decision Shadow Engine consumes:
//! - Trait-based LLM backends (OpenAI-compatible HTTP, mock)
//! - Embedding providers with model-version tagging
//! - Vector store clients (Qdrant-style HTTP, in-memory)
//! - Schema-constrained structured output with corrective retry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            Decision Shadow Engine        │
//! └───────┬──────────────┬───────────┬───────┘
//!         ▼              ▼           ▼
//!  ┌────────────┐ ┌────────────┐ ┌──────────┐
//!  │ LlmBackend │ │ Embedding  │ │ Vector   │
//!  │ + schema   │ │ Backend    │ │ Store    │
//!  └────────────┘ └────────────┘ └──────────┘
//! ```

pub mod backend;
pub mod embedding;
pub mod schema;
pub mod store;

// Re-export main types for convenience
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use embedding::{EmbeddingBackend, EmbeddingError, MockEmbeddings, OpenAiEmbeddings};
pub use schema::{complete_structured, FieldKind, ResponseSchema, SchemaError};
pub use store::{CasePoint, MemoryStore, QdrantStore, StoreError, VectorStore};
