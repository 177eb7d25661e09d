//! In-memory vector store for tests and local runs.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use casefile::{Case, FilterPredicate};

use super::{CasePoint, SearchHit, StoreError, VectorStore};

/// In-memory store with cosine-similarity search.
///
/// Enforces the embedding-model contract: searching with a model id the
/// store has no vectors for (while holding vectors from another model)
/// fails with [`StoreError::ModelMismatch`]. Outages are injectable for
/// retry-path tests.
pub struct MemoryStore {
    points: RwLock<Vec<CasePoint>>,
    fail_remaining: AtomicU32,
    search_calls: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            points: RwLock::new(Vec::new()),
            fail_remaining: AtomicU32::new(0),
            search_calls: AtomicU32::new(0),
        }
    }

    /// Make the next `n` search/scroll calls fail as unavailable.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of search/scroll calls observed.
    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn check_outage(&self) -> Result<(), StoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }

    fn matches_filters(case: &Case, filters: &[FilterPredicate]) -> bool {
        filters.iter().all(|predicate| {
            case.field(&predicate.field)
                .map(|value| predicate.matches(value))
                .unwrap_or(false)
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, point: CasePoint) -> Result<(), StoreError> {
        let mut points = self.points.write().await;
        points.retain(|p| p.id != point.id);
        points.push(point);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        model_id: &str,
        filters: &[FilterPredicate],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.check_outage()?;

        let points = self.points.read().await;
        let same_model: Vec<&CasePoint> =
            points.iter().filter(|p| p.model_id == model_id).collect();

        if same_model.is_empty() {
            if let Some(other) = points.first() {
                return Err(StoreError::ModelMismatch {
                    stored: other.model_id.clone(),
                    requested: model_id.to_string(),
                });
            }
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = same_model
            .into_iter()
            .filter(|p| Self::matches_filters(&p.case, filters))
            .map(|p| SearchHit {
                id: p.case.id.clone(),
                score: cosine(vector, &p.vector),
                case: p.case.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        filters: &[FilterPredicate],
        limit: usize,
    ) -> Result<Vec<Case>, StoreError> {
        self.check_outage()?;

        let points = self.points.read().await;
        Ok(points
            .iter()
            .filter(|p| Self::matches_filters(&p.case, filters))
            .take(limit)
            .map(|p| p.case.clone())
            .collect())
    }
}
