//! Shadow generation: the fixed set of decision alternatives for a case.
//!
//! Generation is pure and local. Alternatives come from a declarative rule
//! set associating case field ranges with parameter derivations, so the set
//! is deterministic given the configuration and independent of retrieval.

use serde::{Deserialize, Serialize};
use tracing::debug;

use casefile::{Alternative, AlternativeLabel, Case};

use crate::types::{EngineError, Result};

/// Gating condition of a shadow rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RuleCondition {
    /// Rule always applies
    Always,
    /// Applies when a numeric field is at least `value`
    NumberAtLeast { field: String, value: f64 },
    /// Applies when a numeric field is at most `value`
    NumberAtMost { field: String, value: f64 },
    /// Applies when the case carries the field at all
    FieldPresent { field: String },
}

impl RuleCondition {
    /// Evaluate the condition against a case.
    pub fn evaluate(&self, case: &Case) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::NumberAtLeast { field, value } => {
                case.number(field).map(|n| n >= *value).unwrap_or(false)
            }
            RuleCondition::NumberAtMost { field, value } => {
                case.number(field).map(|n| n <= *value).unwrap_or(false)
            }
            RuleCondition::FieldPresent { field } => case.field(field).is_some(),
        }
    }
}

/// How a rule derives one alternative parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum ParameterSource {
    /// Fixed value
    Constant { value: f64 },
    /// A fraction of a numeric case field (e.g. 0.75 of the requested amount)
    FractionOfField { field: String, fraction: f64 },
}

/// One derived parameter of an alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRule {
    pub name: String,
    #[serde(flatten)]
    pub source: ParameterSource,
}

impl ParameterRule {
    pub fn constant(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            source: ParameterSource::Constant { value },
        }
    }

    pub fn fraction_of(name: &str, field: &str, fraction: f64) -> Self {
        Self {
            name: name.to_string(),
            source: ParameterSource::FractionOfField {
                field: field.to_string(),
                fraction,
            },
        }
    }
}

/// One declarative rule producing one alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowRule {
    /// Label of the produced alternative; unique across the rule set
    pub label: AlternativeLabel,
    /// Gating condition; rules that do not apply produce nothing
    pub condition: RuleCondition,
    /// Parameter derivations
    pub parameters: Vec<ParameterRule>,
    /// Seed text carried into agent prompts
    pub rationale: Option<String>,
}

/// The declarative rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    pub rules: Vec<ShadowRule>,
}

impl ShadowConfig {
    /// The default credit-decision rule set: full approval, reduced terms,
    /// deferral, rejection.
    pub fn credit_default() -> Self {
        Self {
            rules: vec![
                ShadowRule {
                    label: AlternativeLabel::Approve,
                    condition: RuleCondition::Always,
                    parameters: vec![
                        ParameterRule::fraction_of("credit_amount", "credit_amount", 1.0),
                        ParameterRule::constant("interest_rate", 0.08),
                        ParameterRule::constant("term_years", 30.0),
                    ],
                    rationale: Some("grant the full requested amount at the standard rate".into()),
                },
                ShadowRule {
                    label: AlternativeLabel::Conditional,
                    condition: RuleCondition::Always,
                    parameters: vec![
                        ParameterRule::fraction_of("credit_amount", "credit_amount", 0.75),
                        ParameterRule::constant("interest_rate", 0.065),
                        ParameterRule::constant("term_years", 30.0),
                    ],
                    rationale: Some("reduced exposure at a lower rate".into()),
                },
                ShadowRule {
                    label: AlternativeLabel::Defer,
                    condition: RuleCondition::Always,
                    parameters: vec![],
                    rationale: Some("postpone pending further documentation".into()),
                },
                ShadowRule {
                    label: AlternativeLabel::Reject,
                    condition: RuleCondition::Always,
                    parameters: vec![ParameterRule::constant("credit_amount", 0.0)],
                    rationale: Some("decline the request".into()),
                },
            ],
        }
    }

    /// Reject rule sets that could ever produce two alternatives with the
    /// same label in one run.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.label) {
                return Err(EngineError::Config(format!(
                    "duplicate shadow rule label: {}",
                    rule.label
                )));
            }
        }
        Ok(())
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self::credit_default()
    }
}

/// Generates the alternative set for a case from the configured rules.
pub struct ShadowGenerator {
    config: ShadowConfig,
}

impl ShadowGenerator {
    /// Create a generator over a validated rule set.
    pub fn new(config: ShadowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Produce the alternative set for a case.
    ///
    /// Missing numeric fields a firing rule derives from are an input
    /// error: the case cannot be analyzed until the caller supplies them.
    pub fn generate(&self, case: &Case) -> Result<Vec<Alternative>> {
        let mut alternatives = Vec::new();

        for rule in &self.config.rules {
            if !rule.condition.evaluate(case) {
                continue;
            }

            let mut alternative = Alternative::new(rule.label);
            for parameter in &rule.parameters {
                let value = match &parameter.source {
                    ParameterSource::Constant { value } => *value,
                    ParameterSource::FractionOfField { field, fraction } => {
                        let base = case.number(field).ok_or_else(|| {
                            EngineError::InvalidCase(format!(
                                "case '{}' is missing numeric field '{}' required by the {} rule",
                                case.id, field, rule.label
                            ))
                        })?;
                        base * fraction
                    }
                };
                alternative = alternative.with_parameter(&parameter.name, value);
            }
            if let Some(rationale) = &rule.rationale {
                alternative = alternative.with_rationale(rationale.clone());
            }
            alternatives.push(alternative);
        }

        debug!(
            case_id = %case.id,
            alternatives = alternatives.len(),
            "Generated shadow alternatives"
        );
        Ok(alternatives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> Case {
        Case::new("c-1", "45-year-old client requesting $100k")
            .with_field("credit_amount", 100_000.0)
            .with_field("income_total", 40_000.0)
    }

    #[test]
    fn test_default_rules_generate_four_alternatives() {
        let generator = ShadowGenerator::new(ShadowConfig::credit_default()).unwrap();
        let alternatives = generator.generate(&case()).unwrap();

        let labels: Vec<_> = alternatives.iter().map(|a| a.label).collect();
        assert_eq!(
            labels,
            vec![
                AlternativeLabel::Approve,
                AlternativeLabel::Conditional,
                AlternativeLabel::Defer,
                AlternativeLabel::Reject,
            ]
        );

        let conditional = &alternatives[1];
        assert_eq!(conditional.parameter("credit_amount"), Some(75_000.0));
        assert_eq!(conditional.parameter("interest_rate"), Some(0.065));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = ShadowGenerator::new(ShadowConfig::credit_default()).unwrap();
        let a = generator.generate(&case()).unwrap();
        let b = generator.generate(&case()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_required_field_is_invalid_case() {
        let generator = ShadowGenerator::new(ShadowConfig::credit_default()).unwrap();
        let bare = Case::new("c-2", "no amount recorded");

        let err = generator.generate(&bare).unwrap_err();
        match err {
            EngineError::InvalidCase(message) => {
                assert!(message.contains("credit_amount"));
                assert!(message.contains("c-2"));
            }
            other => panic!("expected InvalidCase, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let mut config = ShadowConfig::credit_default();
        config.rules.push(ShadowRule {
            label: AlternativeLabel::Approve,
            condition: RuleCondition::Always,
            parameters: vec![],
            rationale: None,
        });

        assert!(matches!(
            ShadowGenerator::new(config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_condition_gating() {
        let config = ShadowConfig {
            rules: vec![ShadowRule {
                label: AlternativeLabel::Conditional,
                condition: RuleCondition::NumberAtLeast {
                    field: "credit_amount".to_string(),
                    value: 500_000.0,
                },
                parameters: vec![],
                rationale: None,
            }],
        };
        let generator = ShadowGenerator::new(config).unwrap();

        // Amount below the gate: rule does not fire
        assert!(generator.generate(&case()).unwrap().is_empty());
    }
}
