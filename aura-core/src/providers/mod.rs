//! LLM provider implementations.
//!
//! Every supported provider (Ollama, DeepSeek, OpenAI) speaks the OpenAI chat
//! completions format, so one client serves all three. Use `create_provider()`
//! to instantiate the provider named by the configuration.

pub mod models;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use crate::config::RetryConfig;
pub use models::{ModelInfo, ProviderKind};
pub use openai_compat::OpenAiCompatibleProvider;

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs`),
/// `LlmError::Connection`, and `LlmError::Timeout`. Permanent errors (auth, parse)
/// return immediately. With `max_retries == 0` the operation runs exactly once.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LlmError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let computed = base.min(config.max_backoff_ms as f64) as u64;
    match err {
        LlmError::RateLimited { retry_after_secs } => (retry_after_secs * 1000).max(computed),
        _ => computed,
    }
}

/// Create an LLM provider based on the configuration.
///
/// Fails fast on an unknown provider key or a missing credential for a
/// provider that requires one; no request is made.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let provider = OpenAiCompatibleProvider::new(config)?;
    tracing::info!(
        provider = %provider.kind(),
        model = %config.model,
        base_url = %provider.base_url(),
        "Created LLM provider"
    );
    Ok(Arc::new(provider))
}
