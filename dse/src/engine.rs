//! ShadowEngine - the facade the API layer consumes.
//!
//! Wires query understanding, retrieval, and orchestration together and
//! owns the only cross-run state in the system: the recorded-decision
//! ledger the Bias agent reads. Everything else is per-run and discarded
//! with the report.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use casefile::{Case, FieldCatalog, FilterPredicate, SimilarCase};
use shadow_agent::backend::traits::LlmBackend;
use shadow_agent::embedding::EmbeddingBackend;
use shadow_agent::store::VectorStore;

use crate::agents::AgentRunner;
use crate::config::{AgentWeight, EngineConfig};
use crate::orchestrator::Orchestrator;
use crate::query::QueryUnderstanding;
use crate::retrieval::HybridRetriever;
use crate::types::{
    AgentJudgment, DecisionReport, EngineError, RecordedDecision, Result,
};

/// Per-call overrides for an analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Number of similar cases to retrieve
    pub top_k: Option<usize>,
    /// Minimum similarity for retrieved cases
    pub similarity_floor: Option<f32>,
    /// Scoring weight overrides, keyed by agent name
    pub weights: Option<std::collections::BTreeMap<String, AgentWeight>>,
}

/// The Decision Shadow Engine.
pub struct ShadowEngine {
    config: EngineConfig,
    understanding: QueryUnderstanding,
    retriever: Arc<HybridRetriever>,
    runner: Arc<AgentRunner>,
    ledger: DashMap<String, Vec<RecordedDecision>>,
}

impl std::fmt::Debug for ShadowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowEngine")
            .field("config", &self.config)
            .field("ledger_len", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl ShadowEngine {
    /// Create an engine over the external collaborators.
    pub fn new(
        config: EngineConfig,
        catalog: FieldCatalog,
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn VectorStore>,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<Self> {
        // Surface rule-set problems at construction, not mid-run
        config.shadow.validate()?;

        let retriever = Arc::new(HybridRetriever::new(embedder, store));
        let runner = Arc::new(AgentRunner::new(
            Arc::clone(&backend),
            config.agents.clone(),
        ));
        let mut understanding = QueryUnderstanding::new(catalog, config.query.clone());
        if config.query.infer_filters_from_text {
            understanding = understanding.with_backend(backend);
        }

        info!(
            embedding_model = retriever.embedding_model(),
            fingerprint = %config.fingerprint(),
            "ShadowEngine initialized"
        );

        Ok(Self {
            config,
            understanding,
            retriever,
            runner,
            ledger: DashMap::new(),
        })
    }

    /// Create a builder.
    pub fn builder() -> ShadowEngineBuilder {
        ShadowEngineBuilder::new()
    }

    /// Analyze a case: retrieve precedents, generate the shadow set, score
    /// every alternative, and return one report.
    ///
    /// With no `raw_query`, the case's own text drives retrieval.
    pub async fn analyze(
        &self,
        case: &Case,
        raw_query: Option<&str>,
        explicit_filters: Vec<FilterPredicate>,
        options: AnalyzeOptions,
    ) -> Result<DecisionReport> {
        let top_k = options
            .top_k
            .unwrap_or(self.config.query.default_top_k)
            .min(self.config.query.max_top_k);
        let floor = options
            .similarity_floor
            .unwrap_or(self.config.query.default_similarity_floor);

        let text = raw_query.unwrap_or(case.text.as_str());
        let query = self
            .understanding
            .parse(Some(text), explicit_filters, top_k, floor)
            .await?;

        let mut config = self.config.clone();
        if let Some(weights) = options.weights {
            config.scoring.weights = weights;
        }

        let orchestrator = Orchestrator::new(
            config,
            Arc::clone(&self.retriever),
            Arc::clone(&self.runner),
        )?;
        orchestrator.run(case, &query).await
    }

    /// Standalone similarity search, for search-only callers.
    ///
    /// Unlike `analyze`, a store failure here surfaces directly so the
    /// caller can retry on their own terms.
    pub async fn retrieve(
        &self,
        raw_query: Option<&str>,
        explicit_filters: Vec<FilterPredicate>,
        top_k: Option<usize>,
        similarity_floor: Option<f32>,
    ) -> Result<Vec<SimilarCase>> {
        let top_k = top_k
            .unwrap_or(self.config.query.default_top_k)
            .min(self.config.query.max_top_k);
        let floor = similarity_floor.unwrap_or(self.config.query.default_similarity_floor);

        let query = self
            .understanding
            .parse(raw_query, explicit_filters, top_k, floor)
            .await?;
        Ok(self.retriever.retrieve(&query).await?)
    }

    /// Record a decision into the cross-run ledger.
    pub fn record_decision(&self, decision: RecordedDecision) {
        self.ledger
            .entry(decision.actor_id.clone())
            .or_default()
            .push(decision);
    }

    /// An actor's recorded decision history.
    pub fn decision_history(&self, actor_id: &str) -> Vec<RecordedDecision> {
        self.ledger
            .get(actor_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// On-demand Bias review over an actor's recorded decisions.
    pub async fn bias_review(&self, actor_id: &str) -> AgentJudgment {
        let history = self.decision_history(actor_id);
        self.runner.bias_review(actor_id, &history).await
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Builder for a ShadowEngine.
pub struct ShadowEngineBuilder {
    config: EngineConfig,
    catalog: FieldCatalog,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    store: Option<Arc<dyn VectorStore>>,
    backend: Option<Arc<dyn LlmBackend>>,
}

impl ShadowEngineBuilder {
    /// Create a builder with defaults.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            catalog: FieldCatalog::credit_default(),
            embedder: None,
            store: None,
            backend: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the field catalog.
    pub fn catalog(mut self, catalog: FieldCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector store.
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the LLM backend.
    pub fn backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<ShadowEngine> {
        let embedder = self
            .embedder
            .ok_or_else(|| EngineError::Config("no embedding provider configured".into()))?;
        let store = self
            .store
            .ok_or_else(|| EngineError::Config("no vector store configured".into()))?;
        let backend = self
            .backend
            .ok_or_else(|| EngineError::Config("no LLM backend configured".into()))?;

        ShadowEngine::new(self.config, self.catalog, embedder, store, backend)
    }
}

impl Default for ShadowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use casefile::AlternativeLabel;
    use shadow_agent::backend::MockBackend;
    use shadow_agent::embedding::{EmbeddingBackend as _, MockEmbeddings};
    use shadow_agent::store::{CasePoint, MemoryStore, VectorStore as _};

    use crate::types::{AgentKind, RunState};

    const RISK_OK: &str =
        r#"{"risk_score": 4.0, "default_probability": 0.2, "risk_factors": ["baseline"]}"#;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let embedder = MockEmbeddings::new(32);
        let corpus = [
            ("h-1", "mid-career applicant, similar amount, repaid in full", false),
            ("h-2", "applicant with comparable income, later defaulted", true),
            ("h-3", "older applicant, smaller loan, repaid", false),
        ];
        for (id, text, defaulted) in corpus {
            let vector = embedder.embed(text).await.unwrap();
            store
                .upsert(CasePoint {
                    id: id.to_string(),
                    vector,
                    model_id: embedder.model_id().to_string(),
                    case: Case::new(id, text).with_field("defaulted", defaulted),
                })
                .await
                .unwrap();
        }
        store
    }

    fn engine_with(store: Arc<MemoryStore>, backend: Arc<MockBackend>) -> ShadowEngine {
        let mut config = EngineConfig::default();
        config.retrieval.retry_base_delay_ms = 1;
        config.agents.max_concurrent_llm_calls = 1;

        ShadowEngine::builder()
            .config(config)
            .embedder(Arc::new(MockEmbeddings::new(32)))
            .store(store)
            .backend(backend)
            .build()
            .unwrap()
    }

    fn applicant() -> Case {
        Case::new("c-1", "mid-career applicant requesting a home loan")
            .with_field("credit_amount", 100_000.0)
            .with_field("income_total", 55_000.0)
    }

    #[tokio::test]
    async fn test_analyze_end_to_end() {
        let backend = Arc::new(MockBackend::default().with_queued_responses([
            // Historian
            r#"{"common_patterns": ["mid-career borrowers"], "key_precedents": ["h-1"],
                "risk_indicators": ["one default among peers"]}"#,
            // Four risk assessments
            r#"{"risk_score": 6.0, "default_probability": 0.3, "risk_factors": ["full exposure"]}"#,
            r#"{"risk_score": 4.0, "default_probability": 0.2, "risk_factors": ["reduced exposure"]}"#,
            r#"{"risk_score": 3.0, "default_probability": 0.1, "risk_factors": ["delay only"]}"#,
            r#"{"risk_score": 2.0, "default_probability": 0.05, "risk_factors": ["no exposure"]}"#,
            // Explainer
            r#"{"narrative": "Rejection minimizes risk; conditional terms are the balanced path."}"#,
        ]));

        let engine = engine_with(seeded_store().await, backend);
        let report = engine
            .analyze(&applicant(), None, vec![], AnalyzeOptions::default())
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.case_id, "c-1");
        assert_eq!(report.alternatives.len(), 4);
        assert!(!report.similar_cases.is_empty());
        assert!(report.narrative.is_some());
        assert!(!report.config_fingerprint.is_empty());

        // Every alternative carries a historian and a risk judgment
        for entry in &report.alternatives {
            assert!(entry.judgments.iter().any(|j| j.agent == AgentKind::Historian));
            assert!(entry.judgments.iter().any(|j| j.agent == AgentKind::Risk));
        }

        assert_eq!(
            report.recommended().unwrap().alternative.label,
            AlternativeLabel::Reject
        );
    }

    #[tokio::test]
    async fn test_analyze_respects_top_k_override() {
        let backend = Arc::new(MockBackend::default().with_response(RISK_OK));
        let engine = engine_with(seeded_store().await, backend);

        let options = AnalyzeOptions {
            top_k: Some(1),
            ..Default::default()
        };
        let report = engine
            .analyze(&applicant(), None, vec![], options)
            .await
            .unwrap();

        assert_eq!(report.similar_cases.len(), 1);
        assert_eq!(report.similar_cases[0].rank, 1);
    }

    #[tokio::test]
    async fn test_standalone_retrieve() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine_with(seeded_store().await, backend);

        let results = engine
            .retrieve(Some("applicant who repaid a loan"), vec![], Some(2), None)
            .await
            .unwrap();

        assert!(results.len() <= 2);
        assert!(SimilarCase::sequence_is_ranked(&results));
    }

    #[tokio::test]
    async fn test_retrieve_surfaces_store_failure() {
        let store = seeded_store().await;
        store.fail_next(1);
        let backend = Arc::new(MockBackend::default());
        let engine = engine_with(store, backend);

        let err = engine
            .retrieve(Some("anything"), vec![], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_invalid_query_fails_fast() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine_with(seeded_store().await, backend);

        let err = engine
            .retrieve(
                Some("x"),
                vec![FilterPredicate::new(
                    "nonexistent_field",
                    casefile::FilterOp::Eq,
                    1.0,
                )],
                None,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_bias_ledger_and_review() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"tendencies": ["approves most requests"],
                "risk_tolerance": "high", "consistency": "stable"}"#,
        ));
        let engine = engine_with(seeded_store().await, backend);

        for i in 0..3 {
            engine.record_decision(RecordedDecision {
                actor_id: "analyst-7".to_string(),
                case_id: format!("c-{i}"),
                label: AlternativeLabel::Approve,
                outcome: Some(false),
                decided_at: Utc::now(),
            });
        }
        engine.record_decision(RecordedDecision {
            actor_id: "analyst-7".to_string(),
            case_id: "c-3".to_string(),
            label: AlternativeLabel::Reject,
            outcome: None,
            decided_at: Utc::now(),
        });

        let judgment = engine.bias_review("analyst-7").await;
        assert_eq!(judgment.agent, AgentKind::Bias);
        assert!(judgment.findings[0].contains("approval rate 75.0%"));

        // Unknown actor: empty history handled without a model call
        let empty = engine.bias_review("analyst-unknown").await;
        assert!(empty.findings[0].contains("no recorded decisions"));
    }

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let err = ShadowEngine::builder().build().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
