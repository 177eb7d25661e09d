//! Prompt assembly for reasoning agents.
//!
//! Renders cases, retrieved precedents, and alternatives into the textual
//! blocks the agents embed in their LLM prompts.

use crate::alternative::Alternative;
use crate::case::{Case, SimilarCase};

/// Maximum characters of a precedent's text included per prompt entry.
const PRECEDENT_TEXT_LIMIT: usize = 200;

/// Assembles prompt fragments from domain objects.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Render a case profile: structured fields first, then the text.
    pub fn format_case(case: &Case) -> String {
        let mut out = String::new();
        out.push_str(&format!("Case ID: {}\n", case.id));
        for (name, value) in &case.fields {
            out.push_str(&format!("{}: {}\n", name, value.display()));
        }
        if !case.text.is_empty() {
            out.push_str(&format!("Profile: {}\n", case.text));
        }
        out
    }

    /// Render retrieved precedents, most similar first.
    pub fn format_similar_cases(cases: &[SimilarCase]) -> String {
        if cases.is_empty() {
            return "No similar cases found.".to_string();
        }

        let mut blocks = Vec::with_capacity(cases.len());
        for sc in cases {
            let mut block = format!(
                "Case {} (Similarity: {:.3}):\nCase ID: {}\n",
                sc.rank, sc.similarity, sc.case.id
            );
            if let Some(outcome) = sc.case.field("defaulted") {
                block.push_str(&format!("Defaulted: {}\n", outcome.display()));
            }
            let text = truncate(&sc.case.text, PRECEDENT_TEXT_LIMIT);
            block.push_str(&format!("Details: {}\n", text));
            blocks.push(block);
        }
        blocks.join("\n")
    }

    /// Render decision alternatives for comparative analysis.
    pub fn format_alternatives(alternatives: &[Alternative]) -> String {
        if alternatives.is_empty() {
            return "No alternatives provided.".to_string();
        }

        let mut blocks = Vec::with_capacity(alternatives.len());
        for (i, alt) in alternatives.iter().enumerate() {
            let mut lines = vec![
                format!("=== Alternative {} ===", i + 1),
                format!("Label: {}", alt.label),
            ];
            for (name, value) in &alt.parameters {
                lines.push(format!("{name}: {value}"));
            }
            if let Some(seed) = &alt.rationale_seed {
                lines.push(format!("Rationale: {seed}"));
            }
            blocks.push(lines.join("\n"));
        }
        blocks.join("\n\n")
    }

    /// Render a single alternative.
    pub fn format_alternative(alternative: &Alternative) -> String {
        Self::format_alternatives(std::slice::from_ref(alternative))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alternative::AlternativeLabel;

    #[test]
    fn test_format_case() {
        let case = Case::new("c-42", "long-standing customer")
            .with_field("income_total", 90_000.0)
            .with_field("owns_realty", true);

        let rendered = PromptAssembler::format_case(&case);
        assert!(rendered.contains("Case ID: c-42"));
        assert!(rendered.contains("income_total: 90000"));
        assert!(rendered.contains("owns_realty: true"));
        assert!(rendered.contains("Profile: long-standing customer"));
    }

    #[test]
    fn test_format_similar_cases_empty() {
        assert_eq!(
            PromptAssembler::format_similar_cases(&[]),
            "No similar cases found."
        );
    }

    #[test]
    fn test_format_similar_cases_truncates() {
        let long_text = "x".repeat(500);
        let sc = SimilarCase {
            case: Case::new("h-1", long_text).with_field("defaulted", false),
            similarity: 0.912,
            rank: 1,
        };

        let rendered = PromptAssembler::format_similar_cases(&[sc]);
        assert!(rendered.contains("Case 1 (Similarity: 0.912)"));
        assert!(rendered.contains("Defaulted: false"));
        assert!(rendered.contains("..."));
        assert!(rendered.len() < 500);
    }

    #[test]
    fn test_format_alternatives() {
        let alts = vec![
            Alternative::new(AlternativeLabel::Approve).with_parameter("credit_amount", 100_000.0),
            Alternative::new(AlternativeLabel::Reject),
        ];

        let rendered = PromptAssembler::format_alternatives(&alts);
        assert!(rendered.contains("=== Alternative 1 ==="));
        assert!(rendered.contains("Label: APPROVE"));
        assert!(rendered.contains("credit_amount: 100000"));
        assert!(rendered.contains("Label: REJECT"));
    }
}
