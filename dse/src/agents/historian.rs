//! Historian agent: patterns across retrieved precedents.

use chrono::Utc;

use casefile::prompt::PromptAssembler;
use shadow_agent::backend::traits::CompletionRequest;
use shadow_agent::schema::{complete_structured, FieldKind, ResponseSchema, SchemaError};

use super::{default_rate, mean_similarity, precedent_support, AgentRunner, JudgmentContext};
use crate::types::{AgentJudgment, AgentKind};

const SYSTEM_PROMPT: &str = "You are a historian agent analyzing past credit decisions. \
Summarize patterns across the provided precedents. Ground every claim in the cases shown; \
never invent outcomes that are not present in them.";

fn schema() -> ResponseSchema {
    ResponseSchema::new("historical_analysis")
        .field("common_patterns", FieldKind::TextArray)
        .field("key_precedents", FieldKind::TextArray)
        .field("risk_indicators", FieldKind::TextArray)
        .optional_field("notable_differences", FieldKind::TextArray)
}

pub(super) async fn judge(
    runner: &AgentRunner,
    ctx: &JudgmentContext,
) -> Result<AgentJudgment, SchemaError> {
    let config = runner.config();
    let cases = ctx.similar_cases.as_slice();
    let floor = config.historian_confidence_floor;

    // Zero precedents: a valid low-confidence judgment, no model call needed.
    if cases.is_empty() {
        return Ok(AgentJudgment {
            agent: AgentKind::Historian,
            alternative_label: None,
            score: None,
            confidence: floor,
            findings: vec!["no similar historical cases were found".to_string()],
            raw_model_output: String::new(),
            elapsed_ms: 0,
            created_at: Utc::now(),
        });
    }

    let mean_sim = mean_similarity(cases);
    let (rate, counted) = default_rate(cases);
    let confidence = precedent_support(cases.len(), mean_sim).clamp(floor, 1.0);

    let shown = &cases[..cases.len().min(config.max_prompt_cases)];
    let prompt = format!(
        "Current Decision Context:\n{}\nSimilar Past Cases:\n{}\n\
         Task: identify (1) common characteristics across the past cases, \
         (2) key precedents that apply to this case, (3) historical risk indicators, \
         and (4) notable differences from the past cases.",
        PromptAssembler::format_case(&ctx.case),
        PromptAssembler::format_similar_cases(shown),
    );

    let request = CompletionRequest::user(prompt)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(config.historian_temperature)
        .with_timeout_ms(config.llm_timeout_ms)
        .with_max_tokens(1024);

    let reply = complete_structured(runner.backend(), request, &schema()).await?;

    let mut findings = Vec::new();
    if counted > 0 {
        findings.push(format!(
            "historical default rate {:.1}% across {} precedents (mean similarity {:.3})",
            rate * 100.0,
            counted,
            mean_sim
        ));
    }
    for key in ["common_patterns", "risk_indicators"] {
        if let Some(items) = reply.value.get(key).and_then(|v| v.as_array()) {
            findings.extend(items.iter().filter_map(|v| v.as_str().map(String::from)));
        }
    }

    Ok(AgentJudgment {
        agent: AgentKind::Historian,
        alternative_label: None,
        score: None,
        confidence,
        findings,
        raw_model_output: reply.raw,
        elapsed_ms: 0,
        created_at: Utc::now(),
    })
}
