//! Core types for the Decision Shadow Engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use casefile::{Alternative, AlternativeLabel, QueryError, SimilarCase};

use crate::retrieval::RetrievalError;

/// The reasoning agents, dispatched as tagged variants rather than a class
/// hierarchy: each kind selects an invocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Summarizes patterns across retrieved precedents (case-level)
    Historian,
    /// Scores risk per alternative
    Risk,
    /// Reviews an actor's decision history for consistency (on demand)
    Bias,
    /// Narrates the other agents' judgments (case-level)
    Explainer,
}

impl AgentKind {
    /// Stable name used in logs, findings, and scoring-weight config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Historian => "historian",
            AgentKind::Risk => "risk",
            AgentKind::Bias => "bias",
            AgentKind::Explainer => "explainer",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured judgment produced by exactly one agent invocation.
///
/// Failed invocations still produce a judgment (score `None`, failure
/// finding) so the report accounts for every invocation that was attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentJudgment {
    /// Which agent produced this
    pub agent: AgentKind,
    /// Alternative assessed, `None` for case-level agents
    pub alternative_label: Option<AlternativeLabel>,
    /// Agent-native score; `None` when the invocation failed or the agent
    /// does not score
    pub score: Option<f64>,
    /// Confidence in the judgment, in [0, 1]
    pub confidence: f32,
    /// Ordered short text claims
    pub findings: Vec<String>,
    /// Raw model output, kept for auditability
    pub raw_model_output: String,
    /// Wall-clock duration of the invocation
    pub elapsed_ms: u64,
    /// When the judgment was produced
    pub created_at: DateTime<Utc>,
}

impl AgentJudgment {
    /// A judgment for a failed invocation.
    pub fn failed(
        agent: AgentKind,
        alternative_label: Option<AlternativeLabel>,
        finding: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            alternative_label,
            score: None,
            confidence: 0.0,
            findings: vec![finding.into()],
            raw_model_output: String::new(),
            elapsed_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// A judgment for an invocation cut off by the run deadline.
    pub fn timed_out(agent: AgentKind, alternative_label: Option<AlternativeLabel>) -> Self {
        Self::failed(
            agent,
            alternative_label,
            "judgment timed out before completion",
        )
    }

    /// Whether the invocation settled with a usable score.
    pub fn has_score(&self) -> bool {
        self.score.is_some()
    }
}

/// One alternative with its judgments and composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAlternative {
    pub alternative: Alternative,
    pub judgments: Vec<AgentJudgment>,
    pub composite_score: f64,
}

/// State machine of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Retrieving,
    GeneratingShadows,
    Scoring,
    Aggregating,
    /// Terminal: completed cleanly
    Done,
    /// Terminal: completed with partial upstream failure
    Degraded,
}

/// The terminal artifact of an analysis run.
///
/// Built exactly once by the orchestrator after all agent invocations
/// settle; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionReport {
    /// Unique run identifier
    pub run_id: String,
    /// Case this run analyzed
    pub case_id: String,
    /// Terminal state of the run
    pub state: RunState,
    /// Whether any part of the run degraded (retrieval exhaustion or
    /// deadline-cut judgments)
    pub degraded: bool,
    /// Whether retrieval specifically was degraded to an empty precedent set
    pub retrieval_degraded: bool,
    /// Alternatives ordered by composite score descending
    pub alternatives: Vec<ScoredAlternative>,
    /// The precedent snapshot the agents reasoned over
    pub similar_cases: Vec<SimilarCase>,
    /// Explainer narrative, if one was produced
    pub narrative: Option<String>,
    /// Fingerprint of the engine configuration that produced this report
    pub config_fingerprint: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run completed
    pub completed_at: DateTime<Utc>,
}

impl DecisionReport {
    /// The top-ranked alternative, if any were generated.
    pub fn recommended(&self) -> Option<&ScoredAlternative> {
        self.alternatives.first()
    }
}

/// A past decision recorded for an actor, consumed by the Bias agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedDecision {
    /// Who decided
    pub actor_id: String,
    /// Case the decision was about
    pub case_id: String,
    /// The decision taken
    pub label: AlternativeLabel,
    /// Observed outcome, once known (true = defaulted)
    pub outcome: Option<bool>,
    /// When the decision was taken
    pub decided_at: DateTime<Utc>,
}

/// Error types for the engine.
///
/// Only fatal input errors surface to the caller; retrieval and agent
/// failures are absorbed into the report as degraded or isolated markers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Query could not be parsed or validated; the caller must fix it
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// Case input is unusable; the caller must fix it
    #[error("Invalid case: {0}")]
    InvalidCase(String),

    /// Retrieval failed on a standalone retrieve call
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Engine configuration is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
