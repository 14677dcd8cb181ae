//! Brain module: LLM provider abstraction and usage tracking.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions, a cloneable
//! [`Brain`] handle that every pipeline step shares, and a [`MockLlmProvider`]
//! for deterministic tests.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Rough token estimate for a set of messages (~4 chars per token).
    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| m.content.len() / 4 + 4).sum::<usize>() + 3
    }
}

/// Shared handle to a provider with cumulative usage accounting.
///
/// Cloning is cheap; clones share the same counters, so concurrent candidate
/// generations all report into one total.
#[derive(Clone)]
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    usage: Arc<Mutex<TokenUsage>>,
    calls: Arc<AtomicUsize>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            usage: Arc::new(Mutex::new(TokenUsage::default())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Send one completion request, tracking usage.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(
            model = self.provider.model_name(),
            estimated_tokens = self.provider.estimate_tokens(&request.messages),
            temperature = request.temperature,
            "Sending completion request"
        );

        let response = self.provider.complete(request).await?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.track_usage(&response.usage);

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );
        Ok(response)
    }

    pub fn track_usage(&self, usage: &TokenUsage) {
        match self.usage.lock() {
            Ok(mut total) => total.accumulate(usage),
            Err(poisoned) => {
                warn!("Usage counter lock poisoned; recovering");
                poisoned.into_inner().accumulate(usage);
            }
        }
    }

    pub fn total_usage(&self) -> TokenUsage {
        self.usage.lock().map(|u| *u).unwrap_or_else(|p| *p.into_inner())
    }

    /// Number of successful completions made through this handle.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("model", &self.provider.model_name())
            .field("calls", &self.call_count())
            .finish()
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// A mock LLM provider for testing.
///
/// Replies come from, in order: the queue of canned responses, the responder
/// closure, then a fixed default text. Every request is recorded.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    responder: Option<Responder>,
    default_text: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            responder: None,
            default_text: "I'm a mock LLM. No queued responses available.".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            default_text: text.to_string(),
            ..Self::new()
        }
    }

    /// Create a MockLlmProvider whose reply is computed from each request.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        lock(&self.responses).push(Ok(response));
    }

    /// Queue a plain-text reply.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue a failure for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        lock(&self.responses).push(Err(error));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        lock(&self.requests).push(request.clone());

        {
            let mut queued = lock(&self.responses);
            if !queued.is_empty() {
                return queued.remove(0);
            }
        }

        match &self.responder {
            Some(responder) => responder(&request).map(|text| Self::text_response(&text)),
            None => Ok(Self::text_response(&self.default_text)),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
