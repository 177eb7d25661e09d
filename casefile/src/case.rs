//! Case and retrieval-result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed value of a structured case field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean flag (e.g. owns_realty)
    Bool(bool),
    /// Numeric value (amounts, ages, counts)
    Number(f64),
    /// Categorical / free text value
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean view of the value, if it has one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Human-readable rendering for prompts and findings.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// The subject of an analysis run: a structured profile plus the free-text
/// rendering used for embedding.
///
/// Immutable once retrieved; the engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Unique case identifier
    pub id: String,
    /// Named structured fields used for filtering
    pub fields: BTreeMap<String, FieldValue>,
    /// Free-text rendering used for embedding and prompts
    pub text: String,
}

impl Case {
    /// Create a case with no structured fields.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            text: text.into(),
        }
    }

    /// Add a structured field.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Look up a field value.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Numeric value of a field, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_number)
    }
}

/// A historical case returned by similarity search.
///
/// Ordering by similarity descending is an invariant of every retrieval
/// result: `rank` equals 1 plus the count of strictly-higher-similarity
/// results in the same sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCase {
    /// The historical case payload
    pub case: Case,
    /// Similarity to the query, in [0, 1]
    pub similarity: f32,
    /// 1-based rank; 1 is most similar
    pub rank: usize,
}

impl SimilarCase {
    /// Check the rank/similarity invariant over an ordered sequence.
    pub fn sequence_is_ranked(cases: &[SimilarCase]) -> bool {
        cases.iter().enumerate().all(|(i, sc)| {
            sc.rank == i + 1
                && cases
                    .get(i + 1)
                    .map(|next| next.similarity <= sc.similarity)
                    .unwrap_or(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access() {
        let case = Case::new("c-1", "35-year-old client requesting a loan")
            .with_field("income_total", 90_000.0)
            .with_field("owns_realty", true)
            .with_field("occupation", "Managers");

        assert_eq!(case.number("income_total"), Some(90_000.0));
        assert_eq!(case.field("owns_realty").and_then(FieldValue::as_bool), Some(true));
        assert_eq!(case.number("occupation"), None);
        assert!(case.field("missing").is_none());
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Number(150000.0).display(), "150000");
        assert_eq!(FieldValue::Number(0.35).display(), "0.35");
        assert_eq!(FieldValue::Bool(false).display(), "false");
        assert_eq!(FieldValue::Text("Working".into()).display(), "Working");
    }

    #[test]
    fn test_sequence_is_ranked() {
        let mk = |id: &str, sim: f32, rank: usize| SimilarCase {
            case: Case::new(id, ""),
            similarity: sim,
            rank,
        };

        assert!(SimilarCase::sequence_is_ranked(&[]));
        assert!(SimilarCase::sequence_is_ranked(&[
            mk("a", 0.9, 1),
            mk("b", 0.7, 2),
            mk("c", 0.7, 3),
        ]));
        // Non-contiguous ranks
        assert!(!SimilarCase::sequence_is_ranked(&[mk("a", 0.9, 1), mk("b", 0.7, 3)]));
        // Similarity increases with rank
        assert!(!SimilarCase::sequence_is_ranked(&[mk("a", 0.5, 1), mk("b", 0.8, 2)]));
    }
}
