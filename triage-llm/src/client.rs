//! Client facade over one or more LLM backends.
//!
//! Adds first-available backend selection and a bounded per-call timeout so
//! the pipeline never blocks indefinitely on a slow external dependency.
//! The fallback decision stays with the caller: agents branch explicitly on
//! the returned error instead of swallowing it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::traits::{GenerateRequest, GenerateResponse, LlmBackend, LlmError};

/// Default per-call timeout.
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Facade over an ordered list of backends.
pub struct LlmClient {
    backends: Vec<Arc<dyn LlmBackend>>,
    timeout: Duration,
    max_tokens: Option<u32>,
}

impl LlmClient {
    /// Create a client over the given backends, tried in order.
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>) -> Self {
        Self {
            backends,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_tokens: None,
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap generation length on requests that do not set their own limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Generate text through the first available backend.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let backend = self.select_backend().await?;

        let mut request = request;
        if request.max_tokens.is_none() {
            request.max_tokens = self.max_tokens;
        }

        debug!(backend = backend.id(), "Dispatching generate request");

        match tokio::time::timeout(self.timeout, backend.generate(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = backend.id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "LLM call timed out"
                );
                Err(LlmError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Select the first available backend.
    async fn select_backend(&self) -> Result<Arc<dyn LlmBackend>, LlmError> {
        for backend in &self.backends {
            if backend.is_available().await {
                return Ok(Arc::clone(backend));
            }
        }
        Err(LlmError::Unavailable("no backend available".to_string()))
    }
}

/// Strip Markdown JSON fences from model output.
///
/// Models asked for JSON frequently wrap it in ```json ... ``` fences;
/// callers strip before parsing instead of failing.
pub fn strip_json_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[tokio::test]
    async fn test_first_available_backend_wins() {
        let down = Arc::new(MockBackend::new("down").with_available(false));
        let up = Arc::new(MockBackend::new("up").with_response("from up"));

        let client = LlmClient::new(vec![
            down.clone() as Arc<dyn LlmBackend>,
            up.clone() as Arc<dyn LlmBackend>,
        ]);
        let response = client.generate(GenerateRequest::new("hi")).await.unwrap();

        assert_eq!(response.content, "from up");
        assert_eq!(down.call_count(), 0);
        assert_eq!(up.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_backend_available() {
        let client = LlmClient::new(vec![Arc::new(MockBackend::default().with_available(false))
            as Arc<dyn LlmBackend>]);

        let err = client.generate(GenerateRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_default_max_tokens_fills_unset_requests() {
        let backend = Arc::new(MockBackend::new("mock"));
        let client =
            LlmClient::new(vec![backend.clone() as Arc<dyn LlmBackend>]).with_max_tokens(256);

        client.generate(GenerateRequest::new("hi")).await.unwrap();
        assert_eq!(backend.last_request().unwrap().max_tokens, Some(256));

        // A request carrying its own limit keeps it.
        client
            .generate(GenerateRequest::new("hi").with_max_tokens(32))
            .await
            .unwrap();
        assert_eq!(backend.last_request().unwrap().max_tokens, Some(32));
    }

    #[test]
    fn test_strip_json_fences() {
        assert_eq!(strip_json_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("  {\"a\":1}  "), "{\"a\":1}");
    }
}
