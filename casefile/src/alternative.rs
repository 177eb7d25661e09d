//! Decision alternatives ("shadows").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label of a decision alternative.
///
/// The set is closed; one analysis run never contains two alternatives with
/// the same label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlternativeLabel {
    /// Grant the request as asked
    Approve,
    /// Grant with modified terms (reduced amount, adjusted rate, covenants)
    Conditional,
    /// Postpone pending further information
    Defer,
    /// Decline the request
    Reject,
}

impl AlternativeLabel {
    /// Stable name used in prompts, findings, and serialized reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlternativeLabel::Approve => "APPROVE",
            AlternativeLabel::Conditional => "CONDITIONAL",
            AlternativeLabel::Defer => "DEFER",
            AlternativeLabel::Reject => "REJECT",
        }
    }
}

impl std::fmt::Display for AlternativeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One possible decision for a case, with its concrete parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Which decision this alternative represents
    pub label: AlternativeLabel,
    /// Named parameters specific to the alternative (amount, rate, term)
    pub parameters: BTreeMap<String, f64>,
    /// Optional seed text carried into agent prompts
    pub rationale_seed: Option<String>,
}

impl Alternative {
    /// Create an alternative with no parameters.
    pub fn new(label: AlternativeLabel) -> Self {
        Self {
            label,
            parameters: BTreeMap::new(),
            rationale_seed: None,
        }
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, name: &str, value: f64) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    /// Set the rationale seed.
    pub fn with_rationale(mut self, seed: impl Into<String>) -> Self {
        self.rationale_seed = Some(seed.into());
        self
    }

    /// Look up a parameter value.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }
}
