//! The declared field catalog.
//!
//! Retrieval filters may only reference fields declared here; the catalog is
//! also what the query-understanding prompt advertises to the model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::case::FieldValue;

/// Type of a declared case field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Number,
    Text,
    Bool,
}

impl FieldType {
    /// Whether a concrete value matches this declared type.
    pub fn matches(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldType::Number, FieldValue::Number(_))
                | (FieldType::Text, FieldValue::Text(_))
                | (FieldType::Bool, FieldValue::Bool(_))
        )
    }
}

/// The declared, indexed field set of the case corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCatalog {
    fields: BTreeMap<String, FieldType>,
}

impl FieldCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field.
    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(name.to_string(), field_type);
        self
    }

    /// The default credit-domain catalog.
    pub fn credit_default() -> Self {
        Self::new()
            .with_field("defaulted", FieldType::Bool)
            .with_field("income_total", FieldType::Number)
            .with_field("credit_amount", FieldType::Number)
            .with_field("annuity", FieldType::Number)
            .with_field("age_years", FieldType::Number)
            .with_field("employment_years", FieldType::Number)
            .with_field("children", FieldType::Number)
            .with_field("owns_realty", FieldType::Bool)
            .with_field("owns_car", FieldType::Bool)
            .with_field("occupation", FieldType::Text)
            .with_field("education", FieldType::Text)
            .with_field("family_status", FieldType::Text)
            .with_field("housing_type", FieldType::Text)
            .with_field("contract_type", FieldType::Text)
    }

    /// Look up a declared field type.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Whether a field is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate declared fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the catalog declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::credit_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_default_catalog() {
        let catalog = FieldCatalog::credit_default();
        assert_eq!(catalog.field_type("income_total"), Some(FieldType::Number));
        assert_eq!(catalog.field_type("owns_realty"), Some(FieldType::Bool));
        assert_eq!(catalog.field_type("occupation"), Some(FieldType::Text));
        assert!(!catalog.contains("shoe_size"));
    }

    #[test]
    fn test_type_matching() {
        assert!(FieldType::Number.matches(&FieldValue::Number(1.0)));
        assert!(!FieldType::Number.matches(&FieldValue::Text("1".into())));
        assert!(FieldType::Bool.matches(&FieldValue::Bool(true)));
        assert!(!FieldType::Text.matches(&FieldValue::Bool(true)));
    }
}
