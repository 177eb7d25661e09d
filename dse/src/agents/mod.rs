//! Reasoning agents.
//!
//! The agents are a fixed set of variants over one capability -
//! `judge(case, similar_cases, alternative_or_none)` - dispatched by
//! [`AgentKind`] rather than through a class hierarchy. Every LLM-backed
//! judgment goes through the schema-constrained structured-output layer;
//! a failed invocation settles as a null-score judgment with a failure
//! finding instead of aborting the run.

mod bias;
mod explainer;
mod historian;
mod risk;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use casefile::{Alternative, Case, SimilarCase};
use shadow_agent::backend::traits::LlmBackend;
use shadow_agent::schema::SchemaError;

use crate::config::AgentConfig;
use crate::types::{AgentJudgment, AgentKind, RecordedDecision, ScoredAlternative};

/// The immutable snapshot a scoring-phase agent reads.
///
/// Captured once per run before any agent executes; concurrent agents
/// share it without locking.
#[derive(Clone)]
pub struct JudgmentContext {
    pub case: Arc<Case>,
    pub similar_cases: Arc<Vec<SimilarCase>>,
    pub alternative: Option<Alternative>,
}

/// Invokes agents against an LLM backend.
pub struct AgentRunner {
    backend: Arc<dyn LlmBackend>,
    config: AgentConfig,
}

impl AgentRunner {
    pub fn new(backend: Arc<dyn LlmBackend>, config: AgentConfig) -> Self {
        Self { backend, config }
    }

    pub(crate) fn backend(&self) -> &dyn LlmBackend {
        self.backend.as_ref()
    }

    pub(crate) fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Invoke a scoring-phase agent (Historian or Risk) on a context.
    ///
    /// Never errors: invocation failures settle as failed judgments.
    pub async fn judge(&self, kind: AgentKind, ctx: &JudgmentContext) -> AgentJudgment {
        let start = Instant::now();
        let alternative_label = ctx.alternative.as_ref().map(|a| a.label);

        let result = match kind {
            AgentKind::Historian => historian::judge(self, ctx).await,
            AgentKind::Risk => risk::judge(self, ctx).await,
            AgentKind::Bias | AgentKind::Explainer => {
                return AgentJudgment::failed(
                    kind,
                    alternative_label,
                    format!("{kind} agent is not part of the scoring phase"),
                );
            }
        };

        match result {
            Ok(mut judgment) => {
                judgment.elapsed_ms = start.elapsed().as_millis() as u64;
                debug!(
                    agent = %kind,
                    alternative = ?alternative_label,
                    score = ?judgment.score,
                    duration_ms = judgment.elapsed_ms,
                    "Agent judgment settled"
                );
                judgment
            }
            Err(error) => {
                warn!(agent = %kind, alternative = ?alternative_label, error = %error, "Agent invocation failed");
                let finding = match &error {
                    SchemaError::Invalid { violations, .. } => format!(
                        "structured response failed validation after retry: {}",
                        violations.join("; ")
                    ),
                    SchemaError::Llm(e) => format!("model invocation failed: {e}"),
                };
                let mut judgment = AgentJudgment::failed(kind, alternative_label, finding);
                judgment.elapsed_ms = start.elapsed().as_millis() as u64;
                judgment
            }
        }
    }

    /// Invoke the Bias agent over an actor's recorded decision history.
    pub async fn bias_review(
        &self,
        actor_id: &str,
        decisions: &[RecordedDecision],
    ) -> AgentJudgment {
        let start = Instant::now();
        match bias::judge(self, actor_id, decisions).await {
            Ok(mut judgment) => {
                judgment.elapsed_ms = start.elapsed().as_millis() as u64;
                judgment
            }
            Err(error) => {
                warn!(actor_id, error = %error, "Bias review failed");
                let mut judgment = AgentJudgment::failed(
                    AgentKind::Bias,
                    None,
                    format!("bias review failed: {error}"),
                );
                judgment.elapsed_ms = start.elapsed().as_millis() as u64;
                judgment
            }
        }
    }

    /// Invoke the Explainer over the scored alternatives.
    ///
    /// Returns the narrative, or `None` when the invocation failed; the
    /// explainer only narrates, it never changes a score.
    pub async fn explain(&self, case: &Case, scored: &[ScoredAlternative]) -> Option<String> {
        match explainer::narrate(self, case, scored).await {
            Ok(narrative) => Some(narrative),
            Err(error) => {
                warn!(case_id = %case.id, error = %error, "Explainer failed, report ships without narrative");
                None
            }
        }
    }
}

/// Mean similarity across retrieved precedents; 0.0 when there are none.
pub(crate) fn mean_similarity(cases: &[SimilarCase]) -> f32 {
    if cases.is_empty() {
        return 0.0;
    }
    cases.iter().map(|c| c.similarity).sum::<f32>() / cases.len() as f32
}

/// Historical default rate over precedents that carry the outcome field.
///
/// Returns (rate, counted); counted is how many precedents had an outcome.
pub(crate) fn default_rate(cases: &[SimilarCase]) -> (f64, usize) {
    let mut defaults = 0usize;
    let mut counted = 0usize;
    for sc in cases {
        if let Some(defaulted) = sc.case.field("defaulted").and_then(|v| v.as_bool()) {
            counted += 1;
            if defaulted {
                defaults += 1;
            }
        }
    }
    if counted == 0 {
        (0.0, 0)
    } else {
        (defaults as f64 / counted as f64, counted)
    }
}

/// Support the precedent set lends a judgment: more and closer precedents
/// push it towards 1.0.
pub(crate) fn precedent_support(count: usize, mean_sim: f32) -> f32 {
    let volume = (count as f32 / 20.0).min(1.0);
    0.5 * volume + 0.5 * mean_sim
}

#[cfg(test)]
mod tests {
    use super::*;

    fn similar(id: &str, similarity: f32, defaulted: Option<bool>) -> SimilarCase {
        let mut case = Case::new(id, "precedent");
        if let Some(d) = defaulted {
            case = case.with_field("defaulted", d);
        }
        SimilarCase {
            case,
            similarity,
            rank: 1,
        }
    }

    #[test]
    fn test_mean_similarity() {
        assert_eq!(mean_similarity(&[]), 0.0);
        let cases = vec![similar("a", 0.8, None), similar("b", 0.6, None)];
        assert!((mean_similarity(&cases) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_default_rate_skips_unlabeled() {
        let cases = vec![
            similar("a", 0.8, Some(true)),
            similar("b", 0.7, Some(false)),
            similar("c", 0.6, None),
        ];
        let (rate, counted) = default_rate(&cases);
        assert_eq!(counted, 2);
        assert!((rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_precedent_support_saturates() {
        assert!(precedent_support(40, 1.0) <= 1.0);
        assert!(precedent_support(2, 0.5) < precedent_support(20, 0.5));
        assert!(precedent_support(10, 0.3) < precedent_support(10, 0.9));
    }
}
