//! Query understanding.
//!
//! Turns raw text and/or explicit filters into a validated
//! [`CanonicalQuery`]. With filter inference disabled (the default) parsing
//! has no network side effects; with it enabled, the model proposes filters
//! over the declared catalog through the same structured-output layer the
//! agents use, and a failed inference degrades to a plain text search
//! rather than an error.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use casefile::{
    CanonicalQuery, FieldCatalog, FieldValue, FilterOp, FilterPredicate, QueryError,
};
use shadow_agent::backend::traits::{CompletionRequest, LlmBackend};
use shadow_agent::schema::{complete_structured, FieldKind, ResponseSchema};

use crate::config::QueryConfig;

fn inference_schema() -> ResponseSchema {
    ResponseSchema::new("query_understanding")
        .field("search_query", FieldKind::Text)
        .field("explanation", FieldKind::Text)
}

/// A filter proposed by the model; entries that fail to parse are dropped.
#[derive(Debug, Deserialize)]
struct InferredFilter {
    field: String,
    op: String,
    value: serde_json::Value,
}

/// Parses queries against the declared field catalog.
pub struct QueryUnderstanding {
    catalog: FieldCatalog,
    config: QueryConfig,
    backend: Option<Arc<dyn LlmBackend>>,
}

impl QueryUnderstanding {
    /// Create a parser without filter inference.
    pub fn new(catalog: FieldCatalog, config: QueryConfig) -> Self {
        Self {
            catalog,
            config,
            backend: None,
        }
    }

    /// Attach an LLM backend for filter inference (only used when the
    /// config enables it).
    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// The catalog this parser validates against.
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Parse raw text and explicit filters into a canonical query.
    ///
    /// Explicit filters take precedence over inferred filters for the same
    /// field - precedence is by source, not by recency.
    pub async fn parse(
        &self,
        raw_text: Option<&str>,
        explicit_filters: Vec<FilterPredicate>,
        top_k: usize,
        similarity_floor: f32,
    ) -> Result<CanonicalQuery, QueryError> {
        let mut search_text = raw_text.map(str::to_string);
        let mut inferred: Vec<FilterPredicate> = Vec::new();

        if self.config.infer_filters_from_text {
            if let (Some(backend), Some(text)) = (&self.backend, raw_text) {
                let (filters, residual) = self.infer_filters(backend.as_ref(), text).await;
                inferred = filters;
                if let Some(residual) = residual {
                    search_text = if residual.trim().is_empty() {
                        None
                    } else {
                        Some(residual)
                    };
                }
            }
        }

        // Explicit filters win per field
        let mut filters: Vec<FilterPredicate> = inferred
            .into_iter()
            .filter(|inf| !explicit_filters.iter().any(|exp| exp.field == inf.field))
            .collect();
        filters.extend(explicit_filters);

        CanonicalQuery::build(search_text, filters, top_k, similarity_floor, &self.catalog)
    }

    /// Ask the model for filters; failures degrade to no inferred filters.
    async fn infer_filters(
        &self,
        backend: &dyn LlmBackend,
        text: &str,
    ) -> (Vec<FilterPredicate>, Option<String>) {
        let catalog_listing = self
            .catalog
            .iter()
            .map(|(name, field_type)| format!("- {name}: {field_type:?}"))
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are a query understanding assistant for a credit-case search system.\n\
             The corpus has these filterable metadata fields:\n{catalog_listing}\n\
             Extract filters for any attribute covered by a metadata field, and put the\n\
             remaining vague concepts into search_query for semantic search.\n\
             Reply with a JSON object: {{\"filters\": [{{\"field\": ..., \"op\": \
             \"eq\"|\"gte\"|\"lte\", \"value\": ...}}], \"search_query\": \"...\", \
             \"explanation\": \"...\"}}."
        );

        let request = CompletionRequest::user(format!("Parse this query:\n\n{text}"))
            .with_system(system)
            .with_temperature(0.1)
            .with_max_tokens(512);

        let reply = match complete_structured(backend, request, &inference_schema()).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(error = %error, "Filter inference failed, falling back to direct search");
                return (Vec::new(), None);
            }
        };

        let mut filters = Vec::new();
        if let Some(entries) = reply.value.get("filters").and_then(|v| v.as_array()) {
            for entry in entries {
                let parsed: InferredFilter = match serde_json::from_value(entry.clone()) {
                    Ok(parsed) => parsed,
                    Err(_) => continue,
                };
                let Some(predicate) = self.predicate_from_inferred(parsed) else {
                    continue;
                };
                filters.push(predicate);
            }
        }

        let residual = reply
            .value
            .get("search_query")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        debug!(
            inferred = filters.len(),
            residual = residual.as_deref().unwrap_or(""),
            "Filter inference completed"
        );
        (filters, residual)
    }

    fn predicate_from_inferred(&self, inferred: InferredFilter) -> Option<FilterPredicate> {
        if !self.catalog.contains(&inferred.field) {
            warn!(field = %inferred.field, "Dropping inferred filter on undeclared field");
            return None;
        }

        let op = match inferred.op.as_str() {
            "eq" => FilterOp::Eq,
            "gte" => FilterOp::Gte,
            "lte" => FilterOp::Lte,
            other => {
                warn!(op = other, "Dropping inferred filter with unknown operator");
                return None;
            }
        };

        let value = match inferred.value {
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => FieldValue::Number(n.as_f64()?),
            serde_json::Value::String(s) => FieldValue::Text(s),
            _ => return None,
        };

        Some(FilterPredicate {
            field: inferred.field,
            op,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_agent::backend::MockBackend;

    fn understanding() -> QueryUnderstanding {
        QueryUnderstanding::new(FieldCatalog::credit_default(), QueryConfig::default())
    }

    #[tokio::test]
    async fn test_plain_text_query() {
        let query = understanding()
            .parse(Some("clients with stable employment"), vec![], 5, 0.2)
            .await
            .unwrap();

        assert_eq!(query.free_text.as_deref(), Some("clients with stable employment"));
        assert!(query.filters.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_explicit_field_is_fatal_and_named() {
        let err = understanding()
            .parse(
                None,
                vec![FilterPredicate::new("star_sign", FilterOp::Eq, "leo")],
                5,
                0.0,
            )
            .await
            .unwrap_err();

        match err {
            QueryError::UnknownField { field } => assert_eq!(field, "star_sign"),
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_top_k_is_fatal() {
        let err = understanding()
            .parse(Some("anything"), vec![], 0, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidTopK(0)));
    }

    #[tokio::test]
    async fn test_explicit_filters_override_inferred() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"filters": [{"field": "defaulted", "op": "eq", "value": true},
                            {"field": "owns_realty", "op": "eq", "value": true}],
                "search_query": "payment history",
                "explanation": "target and realty filters extracted"}"#,
        ));

        let mut config = QueryConfig::default();
        config.infer_filters_from_text = true;
        let understanding = QueryUnderstanding::new(FieldCatalog::credit_default(), config)
            .with_backend(backend);

        let explicit = vec![FilterPredicate::new("defaulted", FilterOp::Eq, false)];
        let query = understanding
            .parse(Some("defaulted clients who own property"), explicit, 5, 0.0)
            .await
            .unwrap();

        // Inferred defaulted=true lost to explicit defaulted=false
        let defaulted: Vec<_> = query
            .filters
            .iter()
            .filter(|f| f.field == "defaulted")
            .collect();
        assert_eq!(defaulted.len(), 1);
        assert_eq!(defaulted[0].value, FieldValue::Bool(false));

        // Inferred filter on a distinct field survives
        assert!(query.filters.iter().any(|f| f.field == "owns_realty"));
        // Residual search text replaces the raw query
        assert_eq!(query.free_text.as_deref(), Some("payment history"));
    }

    #[tokio::test]
    async fn test_inference_failure_degrades_to_direct_search() {
        let backend = Arc::new(MockBackend::default().with_response("not json, twice"));

        let mut config = QueryConfig::default();
        config.infer_filters_from_text = true;
        let understanding = QueryUnderstanding::new(FieldCatalog::credit_default(), config)
            .with_backend(backend);

        let query = understanding
            .parse(Some("young married clients"), vec![], 5, 0.0)
            .await
            .unwrap();

        assert_eq!(query.free_text.as_deref(), Some("young married clients"));
        assert!(query.filters.is_empty());
    }

    #[tokio::test]
    async fn test_inferred_unknown_fields_are_dropped_not_fatal() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"filters": [{"field": "zodiac", "op": "eq", "value": "leo"},
                            {"field": "children", "op": "gte", "value": 2}],
                "search_query": "", "explanation": "one bogus field"}"#,
        ));

        let mut config = QueryConfig::default();
        config.infer_filters_from_text = true;
        let understanding = QueryUnderstanding::new(FieldCatalog::credit_default(), config)
            .with_backend(backend);

        let query = understanding
            .parse(Some("clients with two or more children"), vec![], 5, 0.0)
            .await
            .unwrap();

        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].field, "children");
        // Empty residual drops the free text entirely; filters carry the query
        assert!(query.free_text.is_none());
    }
}
