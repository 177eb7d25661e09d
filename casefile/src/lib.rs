//! Core domain types for Decision Shadows.
//!
//! This crate holds everything the engine and the service clients share:
//!
//! - [`Case`]: the structured + textual subject of analysis
//! - [`FieldCatalog`]: the declared, indexed field set queries may filter on
//! - [`CanonicalQuery`]: a validated retrieval query (text, filters, top-k)
//! - [`SimilarCase`]: a ranked retrieval result
//! - [`Alternative`]: one of the mutually exclusive decision shadows
//! - [`prompt`]: rendering helpers that turn the above into LLM prompt text
//!
//! Cases and similar cases are read-only views owned by the caller; nothing
//! in this crate mutates them after construction.

pub mod alternative;
pub mod case;
pub mod catalog;
pub mod prompt;
pub mod query;

// Re-export main types
pub use alternative::{Alternative, AlternativeLabel};
pub use case::{Case, FieldValue, SimilarCase};
pub use catalog::{FieldCatalog, FieldType};
pub use query::{CanonicalQuery, FilterOp, FilterPredicate, QueryError};
