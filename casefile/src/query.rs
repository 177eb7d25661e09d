//! Canonical retrieval queries and filter predicates.

use serde::{Deserialize, Serialize};

use crate::case::FieldValue;
use crate::catalog::FieldCatalog;

/// Error types for query construction.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// top_k must be a positive integer
    #[error("top_k must be positive, got {0}")]
    InvalidTopK(usize),

    /// Filter references a field the catalog does not declare
    #[error("unknown filter field: {field}")]
    UnknownField { field: String },

    /// Filter value does not match the declared field type
    #[error("filter value for '{field}' does not match declared type {expected:?}")]
    TypeMismatch {
        field: String,
        expected: crate::catalog::FieldType,
    },

    /// similarity_floor must lie in [0, 1]
    #[error("similarity_floor must be in [0, 1], got {0}")]
    InvalidSimilarityFloor(f32),

    /// Query has neither free text nor filters
    #[error("query is empty: no free text and no filters")]
    Empty,
}

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact match
    Eq,
    /// Greater than or equal (numeric fields)
    Gte,
    /// Less than or equal (numeric fields)
    Lte,
}

/// A single (field, operator, value) predicate over the payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl FilterPredicate {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluate the predicate against a concrete field value.
    pub fn matches(&self, value: &FieldValue) -> bool {
        match self.op {
            FilterOp::Eq => value == &self.value,
            FilterOp::Gte => match (value.as_number(), self.value.as_number()) {
                (Some(actual), Some(bound)) => actual >= bound,
                _ => false,
            },
            FilterOp::Lte => match (value.as_number(), self.value.as_number()) {
                (Some(actual), Some(bound)) => actual <= bound,
                _ => false,
            },
        }
    }
}

/// A validated retrieval query.
///
/// Built once per retrieval call via [`CanonicalQuery::build`], never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalQuery {
    /// Free text for semantic search, if any
    pub free_text: Option<String>,
    /// Ordered filter predicates over declared fields
    pub filters: Vec<FilterPredicate>,
    /// Number of results requested
    pub top_k: usize,
    /// Minimum similarity a result must reach, in [0, 1]
    pub similarity_floor: f32,
}

impl CanonicalQuery {
    /// Validate and build a canonical query against a field catalog.
    ///
    /// Range operators are only admitted on numeric fields; every predicate
    /// must name a declared field with a type-compatible value. The error
    /// names the offending field so callers can fix their input.
    pub fn build(
        free_text: Option<String>,
        filters: Vec<FilterPredicate>,
        top_k: usize,
        similarity_floor: f32,
        catalog: &FieldCatalog,
    ) -> Result<Self, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK(top_k));
        }
        if !(0.0..=1.0).contains(&similarity_floor) {
            return Err(QueryError::InvalidSimilarityFloor(similarity_floor));
        }

        let free_text = free_text.filter(|t| !t.trim().is_empty());
        if free_text.is_none() && filters.is_empty() {
            return Err(QueryError::Empty);
        }

        for predicate in &filters {
            let declared = catalog
                .field_type(&predicate.field)
                .ok_or_else(|| QueryError::UnknownField {
                    field: predicate.field.clone(),
                })?;

            let value_ok = match predicate.op {
                FilterOp::Eq => declared.matches(&predicate.value),
                // Range bounds are numeric regardless of how the field stores them
                FilterOp::Gte | FilterOp::Lte => {
                    declared == crate::catalog::FieldType::Number
                        && predicate.value.as_number().is_some()
                }
            };
            if !value_ok {
                return Err(QueryError::TypeMismatch {
                    field: predicate.field.clone(),
                    expected: declared,
                });
            }
        }

        Ok(Self {
            free_text,
            filters,
            top_k,
            similarity_floor,
        })
    }

    /// Whether the query carries free text for semantic search.
    pub fn has_free_text(&self) -> bool {
        self.free_text.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FieldCatalog {
        FieldCatalog::credit_default()
    }

    #[test]
    fn test_build_valid_query() {
        let query = CanonicalQuery::build(
            Some("stable employment, owns property".to_string()),
            vec![
                FilterPredicate::new("defaulted", FilterOp::Eq, false),
                FilterPredicate::new("income_total", FilterOp::Gte, 300_000.0),
            ],
            5,
            0.3,
            &catalog(),
        )
        .unwrap();

        assert!(query.has_free_text());
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.top_k, 5);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let err = CanonicalQuery::build(Some("x".into()), vec![], 0, 0.0, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTopK(0)));
    }

    #[test]
    fn test_unknown_field_is_named() {
        let err = CanonicalQuery::build(
            None,
            vec![FilterPredicate::new("favorite_color", FilterOp::Eq, "blue")],
            5,
            0.0,
            &catalog(),
        )
        .unwrap_err();

        match err {
            QueryError::UnknownField { field } => assert_eq!(field, "favorite_color"),
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn test_range_on_text_field_rejected() {
        let err = CanonicalQuery::build(
            None,
            vec![FilterPredicate::new("occupation", FilterOp::Gte, 3.0)],
            5,
            0.0,
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { .. }));
    }

    #[test]
    fn test_empty_query_rejected() {
        let err = CanonicalQuery::build(Some("   ".into()), vec![], 5, 0.0, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::Empty));
    }

    #[test]
    fn test_predicate_matching() {
        let gte = FilterPredicate::new("income_total", FilterOp::Gte, 50_000.0);
        assert!(gte.matches(&FieldValue::Number(60_000.0)));
        assert!(!gte.matches(&FieldValue::Number(40_000.0)));
        assert!(!gte.matches(&FieldValue::Text("60000".into())));

        let eq = FilterPredicate::new("owns_realty", FilterOp::Eq, true);
        assert!(eq.matches(&FieldValue::Bool(true)));
        assert!(!eq.matches(&FieldValue::Bool(false)));
    }
}
