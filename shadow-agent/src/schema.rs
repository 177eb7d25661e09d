//! Schema-constrained structured output.
//!
//! Agents never free-text-parse model replies: they declare a
//! [`ResponseSchema`], request JSON output, and run the reply through
//! [`complete_structured`], which extracts the JSON object (markdown fences
//! tolerated), validates every declared field, and retries once with a
//! corrective instruction before giving up.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::traits::{CompletionRequest, LlmBackend, LlmError, Message};

/// Error types for structured completion.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The underlying LLM call failed
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The reply failed schema validation even after the corrective retry
    #[error("Schema validation failed: {}", violations.join("; "))]
    Invalid {
        violations: Vec<String>,
        raw: String,
    },
}

/// Kind of a declared response field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Any string
    Text,
    /// Number, optionally range-bounded
    Number { min: Option<f64>, max: Option<f64> },
    /// Boolean flag
    Bool,
    /// Array of strings
    TextArray,
}

/// One declared field of a response schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// A declarative response schema: named, typed top-level fields.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    /// Create a named schema with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Schema name (used in the request's response format).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a required field.
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: true,
        });
        self
    }

    /// Declare an optional field.
    pub fn optional_field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: false,
        });
        self
    }

    /// Render as a JSON schema object for backends that support it.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let spec = match &field.kind {
                FieldKind::Text => json!({"type": "string"}),
                FieldKind::Bool => json!({"type": "boolean"}),
                FieldKind::TextArray => json!({"type": "array", "items": {"type": "string"}}),
                FieldKind::Number { min, max } => {
                    let mut spec = serde_json::Map::new();
                    spec.insert("type".to_string(), json!("number"));
                    if let Some(min) = min {
                        spec.insert("minimum".to_string(), json!(min));
                    }
                    if let Some(max) = max {
                        spec.insert("maximum".to_string(), json!(max));
                    }
                    Value::Object(spec)
                }
            };
            properties.insert(field.name.clone(), spec);
            if field.required {
                required.push(json!(field.name));
            }
        }

        json!({
            "name": self.name,
            "schema": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }

    /// Validate a JSON object against the declared fields.
    ///
    /// Returns the full list of violations rather than the first, so the
    /// corrective retry can name everything that was wrong.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        let object = match value.as_object() {
            Some(object) => object,
            None => return Err(vec!["response is not a JSON object".to_string()]),
        };

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        violations.push(format!("missing required field '{}'", field.name));
                    }
                }
                Some(actual) => {
                    let ok = match &field.kind {
                        FieldKind::Text => actual.is_string(),
                        FieldKind::Bool => actual.is_boolean(),
                        FieldKind::TextArray => actual
                            .as_array()
                            .map(|items| items.iter().all(Value::is_string))
                            .unwrap_or(false),
                        FieldKind::Number { min, max } => match actual.as_f64() {
                            Some(n) => {
                                min.map(|m| n >= m).unwrap_or(true)
                                    && max.map(|m| n <= m).unwrap_or(true)
                            }
                            None => false,
                        },
                    };
                    if !ok {
                        violations.push(format!(
                            "field '{}' does not match {:?}",
                            field.name, field.kind
                        ));
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Extract the first JSON object from raw model output.
///
/// Tolerates markdown code fences and prose around the object.
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    // Strip markdown fences if present
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Fall back to the outermost brace span
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&stripped[start..=end]).ok()
}

/// A validated structured completion: the parsed object plus the raw text
/// of the reply that produced it, kept for auditability.
#[derive(Debug, Clone)]
pub struct StructuredReply {
    pub value: Value,
    pub raw: String,
}

/// Run a completion constrained to `schema`.
///
/// On extraction or validation failure, retries exactly once with the
/// failed reply and a corrective instruction appended to the conversation;
/// a second failure surfaces as [`SchemaError::Invalid`].
pub async fn complete_structured(
    backend: &dyn LlmBackend,
    request: CompletionRequest,
    schema: &ResponseSchema,
) -> Result<StructuredReply, SchemaError> {
    let base = request.with_json_schema(schema.to_json_schema());

    let first = backend.complete(base.clone()).await?;
    match parse_and_validate(&first.content, schema) {
        Ok(value) => {
            return Ok(StructuredReply {
                value,
                raw: first.content,
            })
        }
        Err(violations) => {
            warn!(
                schema = schema.name(),
                violations = violations.len(),
                "Structured reply invalid, retrying with corrective instruction"
            );

            let corrective = base
                .with_message(Message::assistant(first.content.clone()))
                .with_message(Message::user(format!(
                    "Your previous reply failed validation: {}. \
                     Respond again with ONLY a JSON object matching the requested schema, \
                     no markdown and no commentary.",
                    violations.join("; ")
                )));

            let second = backend.complete(corrective).await?;
            match parse_and_validate(&second.content, schema) {
                Ok(value) => {
                    debug!(schema = schema.name(), "Corrective retry produced valid reply");
                    Ok(StructuredReply {
                        value,
                        raw: second.content,
                    })
                }
                Err(violations) => Err(SchemaError::Invalid {
                    violations,
                    raw: second.content,
                }),
            }
        }
    }
}

fn parse_and_validate(content: &str, schema: &ResponseSchema) -> Result<Value, Vec<String>> {
    let value = extract_json(content)
        .ok_or_else(|| vec!["reply contains no JSON object".to_string()])?;
    schema.validate(&value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn risk_schema() -> ResponseSchema {
        ResponseSchema::new("risk_assessment")
            .field(
                "risk_score",
                FieldKind::Number {
                    min: Some(0.0),
                    max: Some(10.0),
                },
            )
            .field("risk_factors", FieldKind::TextArray)
            .optional_field("summary", FieldKind::Text)
    }

    #[test]
    fn test_extract_json_plain() {
        let value = extract_json(r#"{"risk_score": 4.0}"#).unwrap();
        assert_eq!(value["risk_score"], 4.0);
    }

    #[test]
    fn test_extract_json_fenced() {
        let value = extract_json("```json\n{\"risk_score\": 4.0}\n```").unwrap();
        assert_eq!(value["risk_score"], 4.0);
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let value =
            extract_json("Here is my analysis: {\"risk_score\": 7.5} as requested.").unwrap();
        assert_eq!(value["risk_score"], 7.5);
    }

    #[test]
    fn test_extract_json_none() {
        assert!(extract_json("no json here at all").is_none());
    }

    #[test]
    fn test_validation_reports_all_violations() {
        let schema = risk_schema();
        let violations = schema
            .validate(&json!({"risk_score": 14.0, "risk_factors": "not an array"}))
            .unwrap_err();

        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("risk_score"));
        assert!(violations[1].contains("risk_factors"));
    }

    #[test]
    fn test_optional_field_may_be_absent() {
        let schema = risk_schema();
        schema
            .validate(&json!({"risk_score": 3.0, "risk_factors": ["low income"]}))
            .unwrap();
    }

    #[test]
    fn test_json_schema_rendering() {
        let rendered = risk_schema().to_json_schema();
        assert_eq!(rendered["name"], "risk_assessment");
        assert_eq!(rendered["schema"]["properties"]["risk_score"]["maximum"], 10.0);
        let required = rendered["schema"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
    }

    #[tokio::test]
    async fn test_structured_success_first_try() {
        let backend = MockBackend::default()
            .with_response(r#"{"risk_score": 4.0, "risk_factors": ["thin file"]}"#);

        let reply = complete_structured(&backend, CompletionRequest::user("assess"), &risk_schema())
            .await
            .unwrap();

        assert_eq!(reply.value["risk_score"], 4.0);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_corrective_retry_recovers() {
        let backend = MockBackend::default().with_queued_responses([
            "utter nonsense, no json",
            r#"{"risk_score": 6.0, "risk_factors": ["high ratio"]}"#,
        ]);

        let reply = complete_structured(&backend, CompletionRequest::user("assess"), &risk_schema())
            .await
            .unwrap();

        assert_eq!(reply.value["risk_score"], 6.0);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_two_invalid_replies_fail() {
        let backend = MockBackend::default().with_response("still not json");

        let err = complete_structured(&backend, CompletionRequest::user("assess"), &risk_schema())
            .await
            .unwrap_err();

        assert!(matches!(err, SchemaError::Invalid { .. }));
        assert_eq!(backend.call_count(), 2);
    }
}
