//! Explainer agent: one human-readable narrative over the scored report.
//!
//! Contract: the explainer narrates the numbers it is given and never
//! introduces scores of its own. Only the narrative string of its reply is
//! consumed; nothing it says can alter a judgment or a composite.

use casefile::Case;
use shadow_agent::backend::traits::CompletionRequest;
use shadow_agent::schema::{complete_structured, FieldKind, ResponseSchema, SchemaError};

use super::AgentRunner;
use crate::types::ScoredAlternative;

/// Findings per judgment rendered into the prompt.
const PROMPT_FINDING_LIMIT: usize = 3;

const SYSTEM_PROMPT: &str = "You are an explainer agent writing the final narrative of a \
credit decision analysis for a credit officer. Use ONLY the scores and findings provided; \
you must not introduce new numbers, change any score, or contradict the figures given. \
Be concise and concrete.";

fn schema() -> ResponseSchema {
    ResponseSchema::new("decision_narrative").field("narrative", FieldKind::Text)
}

fn format_scored(scored: &[ScoredAlternative]) -> String {
    let mut blocks = Vec::with_capacity(scored.len());
    for (i, entry) in scored.iter().enumerate() {
        let mut lines = vec![format!(
            "{}. {} (composite score {:.2})",
            i + 1,
            entry.alternative.label,
            entry.composite_score
        )];
        for judgment in &entry.judgments {
            let score = judgment
                .score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "n/a".to_string());
            lines.push(format!(
                "   {} score: {} (confidence {:.2})",
                judgment.agent, score, judgment.confidence
            ));
            for finding in judgment.findings.iter().take(PROMPT_FINDING_LIMIT) {
                lines.push(format!("   - {finding}"));
            }
        }
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n")
}

pub(super) async fn narrate(
    runner: &AgentRunner,
    case: &Case,
    scored: &[ScoredAlternative],
) -> Result<String, SchemaError> {
    let config = runner.config();

    let prompt = format!(
        "Case under analysis: {}\n\n\
         Alternatives, ordered best first:\n{}\n\n\
         Task: write a short narrative explaining the ranking to a credit officer, \
         naming the decisive factors behind the top recommendation.",
        case.id,
        format_scored(scored),
    );

    let request = CompletionRequest::user(prompt)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(config.narrative_temperature)
        .with_timeout_ms(config.llm_timeout_ms)
        .with_max_tokens(1024);

    let reply = complete_structured(runner.backend(), request, &schema()).await?;

    // Only the narrative is consumed, so the explainer cannot smuggle in
    // or alter scores.
    Ok(reply.value["narrative"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use casefile::{Alternative, AlternativeLabel};
    use shadow_agent::backend::MockBackend;

    use crate::config::AgentConfig;
    use crate::types::{AgentJudgment, AgentKind};

    fn scored() -> Vec<ScoredAlternative> {
        let mut risk = AgentJudgment::failed(AgentKind::Risk, Some(AlternativeLabel::Approve), "x");
        risk.score = Some(4.0);
        risk.confidence = 0.8;
        risk.findings = vec!["solid income".to_string()];

        vec![ScoredAlternative {
            alternative: Alternative::new(AlternativeLabel::Approve),
            judgments: vec![risk],
            composite_score: 6.0,
        }]
    }

    #[tokio::test]
    async fn test_narrative_extracted() {
        let backend = Arc::new(
            MockBackend::default()
                .with_response(r#"{"narrative": "Approval is the strongest option."}"#),
        );
        let runner = AgentRunner::new(backend, AgentConfig::default());

        let narrative = runner
            .explain(&Case::new("c-1", "applicant"), &scored())
            .await;

        assert_eq!(narrative.as_deref(), Some("Approval is the strongest option."));
    }

    #[tokio::test]
    async fn test_failure_yields_no_narrative() {
        let backend = Arc::new(MockBackend::default().with_response("no json at all"));
        let runner = AgentRunner::new(backend, AgentConfig::default());

        let narrative = runner
            .explain(&Case::new("c-1", "applicant"), &scored())
            .await;

        assert!(narrative.is_none());
    }

    #[test]
    fn test_prompt_renders_null_scores() {
        let mut entries = scored();
        entries[0].judgments[0].score = None;

        let rendered = format_scored(&entries);
        assert!(rendered.contains("risk score: n/a"));
        assert!(rendered.contains("composite score 6.00"));
    }
}
