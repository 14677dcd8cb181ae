//! OpenAI-compatible LLM provider.
//!
//! Serves OpenAI, DeepSeek and Ollama, which all expose the chat completions
//! API format.

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::{ConfigError, LlmError};
use crate::providers::models::ProviderKind;
use crate::providers::with_retry;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible LLM provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Credentialed providers fail with [`ConfigError::MissingCredential`] when
    /// neither `api_key` nor the `api_key_env` variable supplies a key.
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let kind = ProviderKind::parse(&config.provider)?;
        let api_key = config.resolve_api_key();
        if kind.requires_api_key() && api_key.is_none() {
            return Err(ConfigError::MissingCredential {
                provider: kind.key().to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| kind.base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            kind,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            retry: config.retry.clone(),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| json!({ "role": msg.role.to_string(), "content": msg.content }))
            .collect()
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        });
        if !request.stop_sequences.is_empty() {
            body["stop"] = json!(request.stop_sequences);
        }
        body
    }

    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let text = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No message content in choice".to_string(),
            })?
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage_obj = body.get("usage");
        let usage = TokenUsage {
            input_tokens: usage_obj
                .and_then(|u| u.get("prompt_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
            output_tokens: usage_obj
                .and_then(|u| u.get("completion_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
        };

        let resp_model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            text,
            usage,
            model: resp_model,
            finish_reason,
        })
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: self.kind.key().to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... try again in 7s"
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({status}): {body}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() {
            LlmError::Connection {
                message: format!("{} unreachable at {}: {err}", self.kind, self.base_url),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request failed: {err}"),
            }
        }
    }

    async fn send_once(&self, body: &Value) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "Sending chat completion request");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(self.map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;
        Self::parse_response(&json, &self.model)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.request_body(&request);
        with_retry(&self.retry, || self.send_once(&body)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, key_env: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            model: "test-model".to_string(),
            api_key_env: key_env.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let provider =
            OpenAiCompatibleProvider::new(&config("ollama", "AURA_TEST_NO_SUCH_VAR")).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Ollama);
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_openai_without_key_is_rejected() {
        let err = OpenAiCompatibleProvider::new(&config("openai", "AURA_TEST_NO_SUCH_VAR"))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingCredential { ref provider } if provider == "openai"));
    }

    #[test]
    fn test_explicit_key_and_base_url() {
        let mut cfg = config("deepseek", "AURA_TEST_NO_SUCH_VAR");
        cfg.api_key = Some("sk-test".into());
        cfg.base_url = Some("http://127.0.0.1:9999/v1/".into());
        let provider = OpenAiCompatibleProvider::new(&cfg).unwrap();
        assert_eq!(provider.base_url(), "http://127.0.0.1:9999/v1");
        assert_eq!(provider.model_name(), "test-model");
    }

    #[test]
    fn test_request_body_defaults() {
        let provider =
            OpenAiCompatibleProvider::new(&config("ollama", "AURA_TEST_NO_SUCH_VAR")).unwrap();
        let request = CompletionRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            temperature: 0.7,
            ..Default::default()
        };
        let body = provider.request_body(&request);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 1024);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "model": "gpt-3.5-turbo-0125",
            "choices": [{
                "message": { "role": "assistant", "content": "[[ ## answer ## ]]\n42" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body, "gpt-3.5-turbo").unwrap();
        assert_eq!(resp.text, "[[ ## answer ## ]]\n42");
        assert_eq!(resp.usage.total(), 15);
        assert_eq!(resp.model, "gpt-3.5-turbo-0125");
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = OpenAiCompatibleProvider::parse_response(&json!({}), "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_map_http_error() {
        let provider =
            OpenAiCompatibleProvider::new(&config("ollama", "AURA_TEST_NO_SUCH_VAR")).unwrap();
        let auth = provider.map_http_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(matches!(auth, LlmError::AuthFailed { .. }));

        let body = r#"{"error":{"message":"Rate limit reached, try again in 7s"}}"#;
        let limited = provider.map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(limited, LlmError::RateLimited { retry_after_secs: 7 }));
    }
}
