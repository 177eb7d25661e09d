//! Bias agent: consistency review of an actor's decision history.
//!
//! Operates over recorded past decisions rather than a single run, so it
//! sits outside the scoring critical path and is invoked on demand.

use std::collections::BTreeMap;

use chrono::Utc;

use casefile::AlternativeLabel;
use shadow_agent::backend::traits::CompletionRequest;
use shadow_agent::schema::{complete_structured, FieldKind, ResponseSchema, SchemaError};

use super::AgentRunner;
use crate::types::{AgentJudgment, AgentKind, RecordedDecision};

/// Decisions rendered into the prompt before summarizing the remainder.
const PROMPT_DECISION_LIMIT: usize = 10;

const SYSTEM_PROMPT: &str = "You are a bias agent reviewing one decision-maker's history of \
credit decisions. Identify tendencies, describe their risk tolerance, and assess how \
consistently similar cases were decided. Describe only what the history shows.";

fn schema() -> ResponseSchema {
    ResponseSchema::new("bias_review")
        .field("tendencies", FieldKind::TextArray)
        .field("risk_tolerance", FieldKind::Text)
        .field("consistency", FieldKind::Text)
}

fn format_decisions(decisions: &[RecordedDecision]) -> String {
    let mut lines: Vec<String> = decisions
        .iter()
        .take(PROMPT_DECISION_LIMIT)
        .enumerate()
        .map(|(i, d)| {
            let outcome = match d.outcome {
                Some(true) => "DEFAULTED",
                Some(false) => "REPAID",
                None => "unknown",
            };
            format!(
                "{}. Decision: {} | Case: {} | Outcome: {}",
                i + 1,
                d.label,
                d.case_id,
                outcome
            )
        })
        .collect();

    if decisions.len() > PROMPT_DECISION_LIMIT {
        lines.push(format!(
            "... and {} more decisions",
            decisions.len() - PROMPT_DECISION_LIMIT
        ));
    }
    lines.join("\n")
}

pub(super) async fn judge(
    runner: &AgentRunner,
    actor_id: &str,
    decisions: &[RecordedDecision],
) -> Result<AgentJudgment, SchemaError> {
    if decisions.is_empty() {
        return Ok(AgentJudgment {
            agent: AgentKind::Bias,
            alternative_label: None,
            score: None,
            confidence: 0.1,
            findings: vec![format!("no recorded decisions for actor {actor_id}")],
            raw_model_output: String::new(),
            elapsed_ms: 0,
            created_at: Utc::now(),
        });
    }

    let mut by_label: BTreeMap<AlternativeLabel, usize> = BTreeMap::new();
    for decision in decisions {
        *by_label.entry(decision.label).or_insert(0) += 1;
    }
    let approvals = by_label.get(&AlternativeLabel::Approve).copied().unwrap_or(0);
    let approval_rate = approvals as f64 / decisions.len() as f64;

    let label_summary = by_label
        .iter()
        .map(|(label, count)| format!("{label}: {count}"))
        .collect::<Vec<_>>()
        .join(", ");

    let config = runner.config();
    let prompt = format!(
        "Decision history of actor {}:\n{}\n\
         Aggregate statistics:\n- Total decisions: {}\n- By label: {}\n- Approval rate: {:.1}%\n\
         Task: identify decision tendencies, the actor's risk tolerance, and how consistent \
         their decisions are across similar cases.",
        actor_id,
        format_decisions(decisions),
        decisions.len(),
        label_summary,
        approval_rate * 100.0,
    );

    let request = CompletionRequest::user(prompt)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(config.narrative_temperature)
        .with_timeout_ms(config.llm_timeout_ms)
        .with_max_tokens(1024);

    let reply = complete_structured(runner.backend(), request, &schema()).await?;

    let mut findings = vec![format!(
        "approval rate {:.1}% across {} recorded decisions ({})",
        approval_rate * 100.0,
        decisions.len(),
        label_summary
    )];
    if let Some(items) = reply.value.get("tendencies").and_then(|v| v.as_array()) {
        findings.extend(items.iter().filter_map(|v| v.as_str().map(String::from)));
    }
    if let Some(tolerance) = reply.value.get("risk_tolerance").and_then(|v| v.as_str()) {
        findings.push(format!("risk tolerance: {tolerance}"));
    }
    if let Some(consistency) = reply.value.get("consistency").and_then(|v| v.as_str()) {
        findings.push(format!("consistency: {consistency}"));
    }

    Ok(AgentJudgment {
        agent: AgentKind::Bias,
        alternative_label: None,
        score: None,
        confidence: (decisions.len() as f32 / 20.0).clamp(0.1, 1.0),
        findings,
        raw_model_output: reply.raw,
        elapsed_ms: 0,
        created_at: Utc::now(),
    })
}
