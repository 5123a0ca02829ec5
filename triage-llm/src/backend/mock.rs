//! Mock LLM backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::traits::*;

/// Mock backend for testing.
///
/// Responses are scripted: queued responses are returned in order, then the
/// default response repeats. Call counting lets tests assert whether the
/// LLM path or the deterministic fallback ran.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    default_response: String,
    queued: Mutex<VecDeque<String>>,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            default_response: "Mock response".to_string(),
            queued: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Set the default response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.default_response = content.into();
        self
    }

    /// Queue a response to return before the default.
    pub fn queue_response(self, content: impl Into<String>) -> Self {
        self.queued
            .lock()
            .expect("mock queue poisoned")
            .push_back(content.into());
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of times generate was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The most recent request seen, for asserting on request shaping.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .expect("mock request poisoned")
            .clone()
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

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self
            .last_request
            .lock()
            .expect("mock request poisoned") = Some(request);

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }

        let content = self
            .queued
            .lock()
            .expect("mock queue poisoned")
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());

        Ok(GenerateResponse {
            content,
            model: self.model_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert!(backend.is_available().await);
        assert_eq!(backend.call_count(), 0);

        let response = backend.generate(GenerateRequest::new("Hi")).await.unwrap();

        assert_eq!(response.content, "Hello, world!");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_queued_responses_in_order() {
        let backend = MockBackend::default()
            .queue_response("first")
            .queue_response("second")
            .with_response("default");

        assert_eq!(
            backend.generate(GenerateRequest::new("a")).await.unwrap().content,
            "first"
        );
        assert_eq!(
            backend.generate(GenerateRequest::new("b")).await.unwrap().content,
            "second"
        );
        assert_eq!(
            backend.generate(GenerateRequest::new("c")).await.unwrap().content,
            "default"
        );
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);

        assert!(!backend.is_available().await);

        let result = backend.generate(GenerateRequest::new("Hi")).await;
        assert!(result.is_err());
    }
}
