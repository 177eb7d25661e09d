//! Mock LLM backend for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::*;

/// Mock backend for testing.
///
/// Responses are scripted: each call pops the next queued response, falling
/// back to the default once the queue is empty. Latency and availability are
/// injectable so timeout and degradation paths can be exercised.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    default_response: String,
    queued: Mutex<VecDeque<String>>,
    latency: Mutex<Option<Duration>>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            default_response: "{}".to_string(),
            queued: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the default response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.default_response = content.into();
        self
    }

    /// Queue a response consumed by a single future call, before the default
    /// kicks in. Queued responses are served in FIFO order.
    pub fn push_response(&self, content: impl Into<String>) {
        self.queued.lock().unwrap().push_back(content.into());
    }

    /// Queue several responses at once.
    pub fn with_queued_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut queued = self.queued.lock().unwrap();
            for r in responses {
                queued.push_back(r.into());
            }
        }
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Inject artificial latency per call.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = Some(latency);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let content = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();
        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_default_response() {
        let backend = MockBackend::new("test-model").with_response("{\"ok\": true}");

        assert!(backend.is_available().await);
        let response = backend.complete(CompletionRequest::user("Hi")).await.unwrap();

        assert_eq!(response.content, "{\"ok\": true}");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_queued_responses_served_in_order() {
        let backend = MockBackend::default()
            .with_queued_responses(["first", "second"])
            .with_response("default");

        let a = backend.complete(CompletionRequest::user("1")).await.unwrap();
        let b = backend.complete(CompletionRequest::user("2")).await.unwrap();
        let c = backend.complete(CompletionRequest::user("3")).await.unwrap();

        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(c.content, "default");
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);

        let result = backend.complete(CompletionRequest::user("Hi")).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
    }
}
