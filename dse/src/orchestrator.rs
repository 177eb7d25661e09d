//! Run orchestration.
//!
//! One orchestrator run drives the state machine
//! `Pending → Retrieving → GeneratingShadows → Scoring → Aggregating → Done`
//! (`Degraded` terminal on partial failure), owning the lifecycle of every
//! judgment and of the final report. Agents for distinct alternatives run
//! concurrently over an immutable snapshot, admission-bounded by a
//! semaphore, under a run-level deadline that settles stragglers as
//! timed-out judgments instead of dropping the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use casefile::{CanonicalQuery, Case, SimilarCase};

use crate::agents::{AgentRunner, JudgmentContext};
use crate::config::EngineConfig;
use crate::retrieval::HybridRetriever;
use crate::shadow::ShadowGenerator;
use crate::types::{
    AgentJudgment, AgentKind, DecisionReport, Result, RunState, ScoredAlternative,
};

/// Coordinates one analysis run end to end.
pub struct Orchestrator {
    config: EngineConfig,
    config_fingerprint: String,
    retriever: Arc<HybridRetriever>,
    generator: ShadowGenerator,
    runner: Arc<AgentRunner>,
}

impl Orchestrator {
    /// Create an orchestrator; fails fast on an inconsistent rule set.
    pub fn new(
        config: EngineConfig,
        retriever: Arc<HybridRetriever>,
        runner: Arc<AgentRunner>,
    ) -> Result<Self> {
        let generator = ShadowGenerator::new(config.shadow.clone())?;
        let config_fingerprint = config.fingerprint();
        Ok(Self {
            config,
            config_fingerprint,
            retriever,
            generator,
            runner,
        })
    }

    /// Execute one analysis run.
    ///
    /// Only invalid input surfaces as an error, and it surfaces before any
    /// retrieval or agent work; every other failure degrades into the
    /// report.
    pub async fn run(&self, case: &Case, query: &CanonicalQuery) -> Result<DecisionReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, case_id = %case.id, state = ?RunState::Pending, "Analysis run started");

        // Shadow generation is pure, so running it first surfaces fatal
        // input errors before the store or any agent is touched.
        let alternatives = self.generator.generate(case)?;

        debug!(run_id = %run_id, state = ?RunState::Retrieving, "Retrieving similar cases");
        let (similar_cases, retrieval_degraded) = self.retrieve_with_retry(query, &run_id).await;

        debug!(
            run_id = %run_id,
            state = ?RunState::GeneratingShadows,
            alternatives = alternatives.len(),
            "Shadow set fixed"
        );

        // Immutable snapshot shared by all concurrent agents.
        let case_snapshot = Arc::new(case.clone());
        let similar_snapshot = Arc::new(similar_cases);

        debug!(run_id = %run_id, state = ?RunState::Scoring, "Scoring alternatives");
        let deadline = Instant::now() + Duration::from_millis(self.config.agents.run_deadline_ms);
        let semaphore = Arc::new(Semaphore::new(self.config.agents.max_concurrent_llm_calls));

        // Historian runs once per run, shared across alternatives; Risk runs
        // once per alternative. All are read-only over the snapshot.
        let historian_future = Self::bounded_judge(
            Arc::clone(&self.runner),
            AgentKind::Historian,
            JudgmentContext {
                case: Arc::clone(&case_snapshot),
                similar_cases: Arc::clone(&similar_snapshot),
                alternative: None,
            },
            Arc::clone(&semaphore),
            deadline,
        );

        let risk_futures = alternatives.iter().map(|alternative| {
            Self::bounded_judge(
                Arc::clone(&self.runner),
                AgentKind::Risk,
                JudgmentContext {
                    case: Arc::clone(&case_snapshot),
                    similar_cases: Arc::clone(&similar_snapshot),
                    alternative: Some(alternative.clone()),
                },
                Arc::clone(&semaphore),
                deadline,
            )
        });

        let (historian_settled, risk_settled) = tokio::join!(
            historian_future,
            futures::future::join_all(risk_futures)
        );

        debug!(run_id = %run_id, state = ?RunState::Aggregating, "Aggregating judgments");
        let (historian_judgment, historian_timed_out) = historian_settled;
        let mut timed_out_any = historian_timed_out;

        let mut scored: Vec<ScoredAlternative> = alternatives
            .into_iter()
            .zip(risk_settled)
            .map(|(alternative, (risk_judgment, risk_timed_out))| {
                timed_out_any |= risk_timed_out;
                let judgments = vec![historian_judgment.clone(), risk_judgment];
                let composite_score = self.composite_for(&judgments);
                ScoredAlternative {
                    alternative,
                    judgments,
                    composite_score,
                }
            })
            .collect();

        // Composite descending; the stable sort keeps generation order
        // (the declared rule order) as the tie-break.
        scored.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let narrative = {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                None
            } else {
                match tokio::time::timeout(remaining, self.runner.explain(case, &scored)).await {
                    Ok(narrative) => narrative,
                    Err(_) => {
                        warn!(run_id = %run_id, "Explainer hit the run deadline");
                        None
                    }
                }
            }
        };

        let degraded = retrieval_degraded || timed_out_any;
        let state = if degraded {
            RunState::Degraded
        } else {
            RunState::Done
        };

        let report = DecisionReport {
            run_id: run_id.clone(),
            case_id: case.id.clone(),
            state,
            degraded,
            retrieval_degraded,
            alternatives: scored,
            similar_cases: Arc::try_unwrap(similar_snapshot)
                .unwrap_or_else(|shared| (*shared).clone()),
            narrative,
            config_fingerprint: self.config_fingerprint.clone(),
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            run_id = %run_id,
            state = ?report.state,
            degraded = report.degraded,
            alternatives = report.alternatives.len(),
            similar_cases = report.similar_cases.len(),
            duration_ms = (report.completed_at - report.started_at).num_milliseconds(),
            "Analysis run completed"
        );
        Ok(report)
    }

    /// Retrieval with bounded retries and exponential backoff; exhaustion
    /// degrades to an empty precedent set rather than failing the run.
    async fn retrieve_with_retry(
        &self,
        query: &CanonicalQuery,
        run_id: &str,
    ) -> (Vec<SimilarCase>, bool) {
        let retry = &self.config.retrieval;
        let mut attempt: u32 = 0;

        loop {
            match self.retriever.retrieve(query).await {
                Ok(cases) => return (cases, false),
                Err(error) => {
                    if attempt as usize >= retry.retry_count {
                        warn!(
                            run_id,
                            attempts = attempt + 1,
                            error = %error,
                            "Retrieval retries exhausted, proceeding with empty precedent set"
                        );
                        return (Vec::new(), true);
                    }

                    let delay = retry.retry_base_delay_ms.saturating_mul(1 << attempt);
                    warn!(
                        run_id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        error = %error,
                        "Retrieval failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One agent invocation under the admission semaphore and run deadline.
    ///
    /// Returns the settled judgment plus whether the deadline cut it off.
    async fn bounded_judge(
        runner: Arc<AgentRunner>,
        kind: AgentKind,
        ctx: JudgmentContext,
        semaphore: Arc<Semaphore>,
        deadline: Instant,
    ) -> (AgentJudgment, bool) {
        let label = ctx.alternative.as_ref().map(|a| a.label);

        let _permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return (AgentJudgment::timed_out(kind, label), true),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, runner.judge(kind, &ctx)).await {
            Ok(judgment) => (judgment, false),
            Err(_) => (AgentJudgment::timed_out(kind, label), true),
        }
    }

    /// Composite score: declared weighted combination of agent scores.
    ///
    /// Null scores are excluded and the weights renormalized over the
    /// scores actually present - a failed judgment never drags the
    /// composite towards zero.
    fn composite_for(&self, judgments: &[AgentJudgment]) -> f64 {
        let scoring = &self.config.scoring;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for judgment in judgments {
            let Some(score) = judgment.score else { continue };
            let Some(weight) = scoring.weights.get(judgment.agent.as_str()) else {
                continue;
            };
            if weight.weight <= 0.0 {
                continue;
            }

            let clamped = score.clamp(0.0, scoring.max_score);
            let oriented = if weight.invert {
                scoring.max_score - clamped
            } else {
                clamped
            };
            weighted += weight.weight * oriented;
            total_weight += weight.weight;
        }

        if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        }
    }
}
