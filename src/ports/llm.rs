//! Chat-completion port, plus a model-rotating decorator.
//!
//! `ChatCompletionClient` is the narrow trait the core depends on.
//! `CerebrasRotatingClient` is supplementary: it reproduces
//! `llm_client.py::CerebrasLLMClient`'s model-rotation-then-backoff retry
//! policy as a decorator over any base client, since the original
//! implementation ties rotation tightly to rate limits and this crate's
//! `ConflictResolver`/`FixAgent` adapters are expected to sit on top of it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionResponse {
    pub content: String,
}

/// Errors a base client can signal that tell the rotation decorator whether
/// to rotate models, back off, or give up immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCompletionErrorKind {
    /// HTTP 429, 400 or 404 — rate limited or the selected model is
    /// unavailable; rotate to the next model in the list.
    RateLimitedOrInvalidModel,
    /// Any other failure; not retried by the rotation decorator.
    Other,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionError {
    pub kind: ChatCompletionErrorKind,
    pub message: String,
}

#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ChatCompletionError>;
}

/// Single request against whichever model is currently selected.
#[async_trait]
pub trait ModelScopedClient: Send + Sync {
    async fn chat_completion(&self, model: &str, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ChatCompletionError>;
}

/// Decorates a [`ModelScopedClient`] with Cerebras's model-rotation policy:
/// on a rate-limit/invalid-model error, rotate to the next model in the
/// list; once every model in the list has failed, sleep
/// `10 * 2^attempt` seconds and reset to the first model, up to 5 attempts.
pub struct CerebrasRotatingClient<C> {
    inner: C,
    models: Vec<String>,
    current: AtomicUsize,
    max_rate_limit_retries: u32,
    base_backoff: Duration,
}

impl<C: ModelScopedClient> CerebrasRotatingClient<C> {
    pub fn new(inner: C, models: Vec<String>) -> Self {
        assert!(!models.is_empty(), "CerebrasRotatingClient requires at least one model");
        Self {
            inner,
            models,
            current: AtomicUsize::new(0),
            max_rate_limit_retries: 5,
            base_backoff: Duration::from_secs(10),
        }
    }

    fn current_model(&self) -> &str {
        &self.models[self.current.load(Ordering::SeqCst)]
    }

    /// Advances to the next model; returns `false` once the list is
    /// exhausted (caller should back off and reset).
    fn rotate(&self) -> bool {
        let idx = self.current.load(Ordering::SeqCst);
        if idx + 1 < self.models.len() {
            self.current.store(idx + 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn reset(&self) {
        self.current.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<C: ModelScopedClient> ChatCompletionClient for CerebrasRotatingClient<C> {
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ChatCompletionError> {
        let mut last_error = None;

        for attempt in 0..self.max_rate_limit_retries {
            self.reset();

            loop {
                match self.inner.chat_completion(self.current_model(), request.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(err) if err.kind == ChatCompletionErrorKind::RateLimitedOrInvalidModel => {
                        last_error = Some(err);
                        if self.rotate() {
                            continue;
                        }
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            let backoff = self.base_backoff * 2u32.pow(attempt);
            tracing::warn!(attempt, backoff_secs = backoff.as_secs(), "all cerebras models rate limited, backing off");
            tokio::time::sleep(backoff).await;
        }

        Err(last_error.unwrap_or(ChatCompletionError {
            kind: ChatCompletionErrorKind::Other,
            message: "cerebras rotation exhausted with no recorded error".to_string(),
        }))
    }
}

pub fn chat_completion_error_to_orchestrator(collaborator: &'static str, err: ChatCompletionError) -> OrchestratorError {
    OrchestratorError::CollaboratorFailed { collaborator, message: err.message }
}

pub type ChatCompletionOutcome = OrchestratorResult<ChatCompletionResponse>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyClient {
        calls: Mutex<Vec<String>>,
        fail_models: Vec<String>,
    }

    #[async_trait]
    impl ModelScopedClient for FlakyClient {
        async fn chat_completion(&self, model: &str, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ChatCompletionError> {
            self.calls.lock().unwrap().push(model.to_string());
            if self.fail_models.contains(&model.to_string()) {
                Err(ChatCompletionError {
                    kind: ChatCompletionErrorKind::RateLimitedOrInvalidModel,
                    message: format!("429 on {model}"),
                })
            } else {
                Ok(ChatCompletionResponse { content: format!("ok from {model}") })
            }
        }
    }

    #[tokio::test]
    async fn rotates_to_next_model_on_rate_limit() {
        let client = FlakyClient {
            calls: Mutex::new(Vec::new()),
            fail_models: vec!["a".to_string()],
        };
        let rotating = CerebrasRotatingClient::new(client, vec!["a".to_string(), "b".to_string()]);
        let request = ChatCompletionRequest { messages: vec![], temperature: 0.0, max_tokens: 100 };

        let response = rotating.chat_completion(request).await.unwrap();
        assert_eq!(response.content, "ok from b");
    }

    #[tokio::test]
    async fn non_rate_limit_error_is_not_retried() {
        struct AlwaysFails;

        #[async_trait]
        impl ModelScopedClient for AlwaysFails {
            async fn chat_completion(&self, _model: &str, _request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ChatCompletionError> {
                Err(ChatCompletionError { kind: ChatCompletionErrorKind::Other, message: "boom".to_string() })
            }
        }

        let rotating = CerebrasRotatingClient::new(AlwaysFails, vec!["a".to_string()]);
        let request = ChatCompletionRequest { messages: vec![], temperature: 0.0, max_tokens: 100 };
        let err = rotating.chat_completion(request).await.unwrap_err();
        assert_eq!(err.message, "boom");
    }
}
