//! Qdrant-style HTTP vector store client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use casefile::{FilterOp, FilterPredicate};

use super::{
    case_from_payload, payload_from_case, CasePoint, SearchHit, StoreError, VectorStore,
    PAYLOAD_MODEL,
};

/// HTTP client for a Qdrant-compatible vector store.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
    timeout: Duration,
}

impl QdrantStore {
    /// Create a client for a collection.
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
            timeout: Duration::from_secs(10),
        })
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}/points/{}",
            self.base_url, self.collection, suffix
        )
    }

    /// Build the Qdrant filter clause from predicates, always pinning the
    /// embedding model so incompatible vectors are never compared.
    fn build_filter(filters: &[FilterPredicate], model_id: Option<&str>) -> Option<Value> {
        let mut must: Vec<Value> = Vec::new();

        if let Some(model_id) = model_id {
            must.push(json!({"key": PAYLOAD_MODEL, "match": {"value": model_id}}));
        }

        for predicate in filters {
            let value = match &predicate.value {
                casefile::FieldValue::Bool(b) => json!(b),
                casefile::FieldValue::Number(n) => json!(n),
                casefile::FieldValue::Text(s) => json!(s),
            };
            let condition = match predicate.op {
                FilterOp::Eq => json!({"key": predicate.field, "match": {"value": value}}),
                FilterOp::Gte => json!({"key": predicate.field, "range": {"gte": value}}),
                FilterOp::Lte => json!({"key": predicate.field, "range": {"lte": value}}),
            };
            must.push(condition);
        }

        if must.is_empty() {
            None
        } else {
            Some(json!({"must": must}))
        }
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::RequestFailed(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, point: CasePoint) -> Result<(), StoreError> {
        let url = format!(
            "{}/collections/{}/points",
            self.base_url, self.collection
        );
        let body = json!({
            "points": [{
                "id": uuid::Uuid::new_v4().to_string(),
                "vector": point.vector,
                "payload": payload_from_case(&point.case, &point.model_id),
            }]
        });

        let response = self
            .client
            .put(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::RequestFailed(format!("HTTP {status}: {body}")));
        }

        debug!(case_id = %point.case.id, collection = %self.collection, "Upserted case point");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        model_id: &str,
        filters: &[FilterPredicate],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = Self::build_filter(filters, Some(model_id)) {
            body["filter"] = filter;
        }

        let parsed = self.post(&self.collection_url("search"), body).await?;

        let hits = parsed
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::InvalidResponse("missing result array".to_string()))?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit
                .get("score")
                .and_then(Value::as_f64)
                .ok_or_else(|| StoreError::InvalidResponse("hit missing score".to_string()))?
                as f32;
            let payload = hit
                .get("payload")
                .ok_or_else(|| StoreError::InvalidResponse("hit missing payload".to_string()))?;
            let case = case_from_payload(payload)?;
            results.push(SearchHit {
                id: case.id.clone(),
                score,
                case,
            });
        }

        debug!(
            collection = %self.collection,
            hits = results.len(),
            limit = limit,
            "Vector search completed"
        );
        Ok(results)
    }

    async fn scroll(
        &self,
        filters: &[FilterPredicate],
        limit: usize,
    ) -> Result<Vec<casefile::Case>, StoreError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(filter) = Self::build_filter(filters, None) {
            body["filter"] = filter;
        }

        let parsed = self.post(&self.collection_url("scroll"), body).await?;

        let points = parsed
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::InvalidResponse("missing result.points".to_string()))?;

        let mut cases = Vec::with_capacity(points.len());
        for point in points {
            let payload = point
                .get("payload")
                .ok_or_else(|| StoreError::InvalidResponse("point missing payload".to_string()))?;
            cases.push(case_from_payload(payload)?);
        }
        Ok(cases)
    }
}
