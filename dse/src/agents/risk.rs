//! Risk agent: quantitative assessment of one alternative.

use chrono::Utc;

use casefile::prompt::PromptAssembler;
use shadow_agent::backend::traits::CompletionRequest;
use shadow_agent::schema::{complete_structured, FieldKind, ResponseSchema, SchemaError};

use super::{default_rate, mean_similarity, precedent_support, AgentRunner, JudgmentContext};
use crate::types::{AgentJudgment, AgentKind};

const SYSTEM_PROMPT: &str = "You are a risk agent assessing one credit decision alternative. \
Score risk on a 0-10 scale where 10 is highest risk, estimate the probability of default, \
and name concrete risk factors. Base your assessment on the case profile, the alternative's \
parameters, and the historical statistics provided.";

fn schema() -> ResponseSchema {
    ResponseSchema::new("risk_assessment")
        .field(
            "risk_score",
            FieldKind::Number {
                min: Some(0.0),
                max: Some(10.0),
            },
        )
        .field(
            "default_probability",
            FieldKind::Number {
                min: Some(0.0),
                max: Some(1.0),
            },
        )
        .field("risk_factors", FieldKind::TextArray)
        .optional_field("risk_level", FieldKind::Text)
}

pub(super) async fn judge(
    runner: &AgentRunner,
    ctx: &JudgmentContext,
) -> Result<AgentJudgment, SchemaError> {
    let config = runner.config();
    let alternative = match &ctx.alternative {
        Some(alternative) => alternative,
        None => {
            return Ok(AgentJudgment::failed(
                AgentKind::Risk,
                None,
                "risk agent requires an alternative to assess",
            ))
        }
    };

    let cases = ctx.similar_cases.as_slice();
    let mean_sim = mean_similarity(cases);
    let (rate, counted) = default_rate(cases);

    let shown = &cases[..cases.len().min(config.max_prompt_cases)];
    let prompt = format!(
        "Current Decision Context:\n{}\nAlternative Under Assessment:\n{}\n\
         Historical Context:\n\
         - Similar cases retrieved: {}\n\
         - Mean similarity: {:.3}\n\
         - Historical default rate: {:.1}% (over {} cases with a known outcome)\n\
         Similar Past Cases:\n{}",
        PromptAssembler::format_case(&ctx.case),
        PromptAssembler::format_alternative(alternative),
        cases.len(),
        mean_sim,
        rate * 100.0,
        counted,
        PromptAssembler::format_similar_cases(shown),
    );

    let request = CompletionRequest::user(prompt)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(config.risk_temperature)
        .with_timeout_ms(config.llm_timeout_ms)
        .with_max_tokens(1024);

    let reply = complete_structured(runner.backend(), request, &schema()).await?;

    // Range-validated by the schema
    let risk_score = reply.value["risk_score"].as_f64().unwrap_or(0.0);
    let default_probability = reply.value["default_probability"].as_f64().unwrap_or(0.0);

    let mut findings: Vec<String> = reply
        .value
        .get("risk_factors")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    findings.push(format!("estimated default probability {default_probability:.2}"));
    if let Some(level) = reply.value.get("risk_level").and_then(|v| v.as_str()) {
        findings.push(format!("risk level {level}"));
    }

    Ok(AgentJudgment {
        agent: AgentKind::Risk,
        alternative_label: Some(alternative.label),
        score: Some(risk_score),
        confidence: precedent_support(cases.len(), mean_sim).clamp(0.2, 1.0),
        findings,
        raw_model_output: reply.raw,
        elapsed_ms: 0,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use casefile::{Alternative, AlternativeLabel, Case, SimilarCase};
    use shadow_agent::backend::MockBackend;

    use crate::config::AgentConfig;

    fn context() -> JudgmentContext {
        let similar = vec![SimilarCase {
            case: Case::new("h-1", "precedent").with_field("defaulted", true),
            similarity: 0.8,
            rank: 1,
        }];
        JudgmentContext {
            case: Arc::new(Case::new("c-1", "applicant").with_field("credit_amount", 100_000.0)),
            similar_cases: Arc::new(similar),
            alternative: Some(
                Alternative::new(AlternativeLabel::Approve).with_parameter("credit_amount", 100_000.0),
            ),
        }
    }

    #[tokio::test]
    async fn test_valid_reply_produces_scored_judgment() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"risk_score": 7.5, "default_probability": 0.35,
                "risk_factors": ["high loan-to-income ratio"], "risk_level": "HIGH"}"#,
        ));
        let runner = AgentRunner::new(backend, AgentConfig::default());

        let judgment = runner.judge(AgentKind::Risk, &context()).await;

        assert_eq!(judgment.score, Some(7.5));
        assert_eq!(judgment.alternative_label, Some(AlternativeLabel::Approve));
        assert!(judgment.findings.iter().any(|f| f.contains("0.35")));
        assert!(judgment.findings.iter().any(|f| f.contains("HIGH")));
    }

    #[tokio::test]
    async fn test_out_of_range_score_triggers_retry_then_isolated_failure() {
        // Both replies violate the 0-10 bound; judgment fails in isolation
        let backend = Arc::new(
            MockBackend::default()
                .with_response(r#"{"risk_score": 42.0, "default_probability": 0.5, "risk_factors": []}"#),
        );
        let runner = AgentRunner::new(backend.clone(), AgentConfig::default());

        let judgment = runner.judge(AgentKind::Risk, &context()).await;

        assert!(judgment.score.is_none());
        assert!(judgment.findings[0].contains("validation"));
        // One corrective retry, no more
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_alternative_fails_cleanly() {
        let backend = Arc::new(MockBackend::default());
        let runner = AgentRunner::new(backend.clone(), AgentConfig::default());

        let mut ctx = context();
        ctx.alternative = None;
        let judgment = runner.judge(AgentKind::Risk, &ctx).await;

        assert!(judgment.score.is_none());
        assert_eq!(backend.call_count(), 0);
    }
}
