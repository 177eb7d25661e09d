//! Hybrid retrieval over the vector store.
//!
//! One embedding call per retrieval, overfetch to survive server-side
//! filtering, similarity floor, de-duplication, and contiguous re-ranking.
//! A fresh call re-queries the store; nothing is cached across calls.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use casefile::{CanonicalQuery, Case, SimilarCase};
use shadow_agent::embedding::{EmbeddingBackend, EmbeddingError};
use shadow_agent::store::{SearchHit, StoreError, VectorStore};

/// Error types for retrieval; both variants are retryable by the caller.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hybrid retriever over an embedding provider and a vector store.
pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// The embedding model this retriever searches under.
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }

    /// Retrieve similar cases for a canonical query.
    ///
    /// Zero results after filtering is a valid empty sequence, not an
    /// error; only store/provider failures surface.
    pub async fn retrieve(&self, query: &CanonicalQuery) -> Result<Vec<SimilarCase>, RetrievalError> {
        // Overfetch margin tolerates the store returning fewer matches
        // after applying filters server-side.
        let fetch_limit = query.top_k + query.top_k.max(query.top_k * 2);

        let hits: Vec<SearchHit> = match &query.free_text {
            Some(text) => {
                let vector = self.embedder.embed(text).await?;
                self.store
                    .search(&vector, self.embedder.model_id(), &query.filters, fetch_limit)
                    .await?
            }
            None => {
                // Metadata-only path: exact filter matches, similarity 1.0.
                let cases = self.store.scroll(&query.filters, fetch_limit).await?;
                cases
                    .into_iter()
                    .map(|case: Case| SearchHit {
                        id: case.id.clone(),
                        score: 1.0,
                        case,
                    })
                    .collect()
            }
        };

        let fetched = hits.len();

        // Similarity floor
        let mut hits: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| hit.score >= query.similarity_floor)
            .collect();

        // De-duplicate by case id, keeping the highest-similarity occurrence
        let mut best: HashMap<String, SearchHit> = HashMap::with_capacity(hits.len());
        for hit in hits.drain(..) {
            match best.get(&hit.id) {
                Some(existing) if existing.score >= hit.score => {}
                _ => {
                    best.insert(hit.id.clone(), hit);
                }
            }
        }

        // Re-rank by similarity descending; ties break on case id so two
        // retrievals of an unchanged store order identically.
        let mut deduped: Vec<SearchHit> = best.into_values().collect();
        deduped.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        deduped.truncate(query.top_k);

        let results: Vec<SimilarCase> = deduped
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SimilarCase {
                case: hit.case,
                similarity: hit.score,
                rank: i + 1,
            })
            .collect();

        debug_assert!(SimilarCase::sequence_is_ranked(&results));

        if results.is_empty() {
            info!(fetched, floor = query.similarity_floor, "Retrieval returned no cases");
        } else {
            debug!(
                fetched,
                returned = results.len(),
                top_similarity = results[0].similarity,
                "Retrieval completed"
            );
        }
        Ok(results)
    }
}
