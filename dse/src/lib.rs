//! Decision Shadow Engine (DSE)
//!
//! Pre-decision risk analysis: given a case, retrieve structurally and
//! semantically similar historical cases, synthesize the set of decision
//! alternatives ("shadows"), and score each alternative with a panel of
//! reasoning agents into one explainable report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ShadowEngine                           │
//! │                                                             │
//! │  ┌─────────┐  ┌──────────┐  ┌─────────┐  ┌─────────────┐   │
//! │  │  Query  │──│ Hybrid   │──│ Shadow  │──│Orchestrator │   │
//! │  │ Underst.│  │ Retriever│  │ Generator│ │  + Agents   │   │
//! │  └─────────┘  └──────────┘  └─────────┘  └──────┬──────┘   │
//! │                                                 │          │
//! │                                        ┌────────▼────────┐ │
//! │                                        │ DecisionReport  │ │
//! │                                        └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is stateless between runs apart from the decision ledger the
//! Bias agent reads; every run captures an immutable snapshot of case and
//! precedent data before any agent executes.

pub mod agents;
pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod query;
pub mod retrieval;
pub mod shadow;
pub mod types;

// Re-export main types
pub use config::EngineConfig;
pub use engine::{AnalyzeOptions, ShadowEngine, ShadowEngineBuilder};
pub use types::*;
