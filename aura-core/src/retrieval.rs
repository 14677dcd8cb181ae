//! Retrieval providers.
//!
//! A [`Retriever`] maps `(query, k)` to at most `k` passages. Two backends
//! exist: the built-in [`LocalKnowledgeBase`] and [`ColbertRetriever`], a
//! client for ColBERTv2-style HTTP search endpoints.

use crate::config::{RetrievalConfig, RetrievalMode};
use crate::error::{ConfigError, RetrievalError};
use crate::types::Passage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Source of passages for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages ranked by relevance. `k == 0` returns nothing.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// In-memory knowledge base that always returns its first `k` passages.
#[derive(Debug, Clone)]
pub struct LocalKnowledgeBase {
    passages: Vec<Passage>,
}

impl LocalKnowledgeBase {
    /// The five built-in passages.
    pub fn new() -> Self {
        Self::with_passages(builtin_passages())
    }

    pub fn with_passages(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

impl Default for LocalKnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for LocalKnowledgeBase {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        debug!(query, k, "Local knowledge base lookup");
        Ok(self.passages.iter().take(k).cloned().collect())
    }

    fn name(&self) -> &str {
        "local"
    }
}

fn builtin_passages() -> Vec<Passage> {
    vec![
        Passage::new(
            "DSPy Framework Overview",
            "DSPy is a framework for programming language models (LMs) in a structured, modular way. \
             It allows developers to define 'signatures' that specify input/output fields, and 'modules' \
             that chain together reasoning steps. DSPy supports automatic prompt optimization through \
             techniques like BootstrapFewShot and MIPRO.",
        ),
        Passage::new(
            "RAG Systems Explained",
            "Retrieval-Augmented Generation (RAG) is an AI architecture that combines information \
             retrieval with text generation. It first retrieves relevant documents from a knowledge base, \
             then uses those documents as context for a language model to generate accurate, grounded \
             responses. RAG reduces hallucination and improves factual accuracy.",
        ),
        Passage::new(
            "AI Agents and ReAct Pattern",
            "AI Agents are autonomous systems that can perceive their environment, make decisions, and \
             take actions to achieve goals. Modern AI agents often use large language models (LLMs) as \
             their reasoning engine, combined with tools like web search, calculators, and code execution. \
             The ReAct pattern (Reasoning + Acting) is a popular approach for building AI agents.",
        ),
        Passage::new(
            "Machine Learning Fundamentals",
            "Machine Learning is a subset of artificial intelligence that enables systems to learn and \
             improve from experience without being explicitly programmed. It uses algorithms to analyze \
             data, identify patterns, and make predictions. Common approaches include supervised learning, \
             unsupervised learning, and reinforcement learning.",
        ),
        Passage::new(
            "Chain-of-Thought Reasoning",
            "Chain-of-Thought (CoT) prompting is a technique that encourages language models to break down \
             complex problems into intermediate reasoning steps. This approach significantly improves \
             performance on tasks requiring multi-step reasoning, mathematical calculations, and logical \
             deduction.",
        ),
    ]
}

/// Client for a ColBERTv2-compatible search endpoint (`GET ?query=&k=`).
pub struct ColbertRetriever {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl ColbertRetriever {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, ConfigError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "retrieval url must not be empty".to_string(),
            });
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url,
            timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parse a `{"topk": [...]}` body. Each entry carries `long_text` or `text`
    /// formatted as `"Title | body"`.
    pub fn parse_topk(body: &Value, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let entries = body
            .get("topk")
            .and_then(|t| t.as_array())
            .ok_or_else(|| RetrievalError::MalformedResponse {
                message: "missing 'topk' array".to_string(),
            })?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                entry
                    .get("long_text")
                    .or_else(|| entry.get("text"))
                    .and_then(|t| t.as_str())
            })
            .take(k)
            .map(split_title)
            .collect())
    }
}

fn split_title(raw: &str) -> Passage {
    match raw.split_once(" | ") {
        Some((title, body)) => Passage::new(title.trim(), body.trim()),
        None => Passage::new("", raw.trim()),
    }
}

#[async_trait]
impl Retriever for ColbertRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        debug!(url = %self.url, query, k, "Remote retrieval request");

        let k_param = k.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query), ("k", k_param.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    RetrievalError::Request {
                        url: self.url.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Request {
                url: self.url.clone(),
                message: format!("HTTP {status}"),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::MalformedResponse {
                message: e.to_string(),
            })?;
        Self::parse_topk(&body, k)
    }

    fn name(&self) -> &str {
        "colbert"
    }
}

/// Build the retriever selected by the configuration.
pub fn create_retriever(config: &RetrievalConfig) -> Result<Arc<dyn Retriever>, ConfigError> {
    let retriever: Arc<dyn Retriever> = match config.mode {
        RetrievalMode::Local => Arc::new(LocalKnowledgeBase::new()),
        RetrievalMode::Colbert => Arc::new(ColbertRetriever::new(
            config.url.clone(),
            config.timeout_secs,
        )?),
    };
    info!(backend = retriever.name(), "Created retriever");
    Ok(retriever)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_local_returns_first_k() {
        let kb = LocalKnowledgeBase::new();
        let passages = kb.retrieve("anything", 2).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].title, "DSPy Framework Overview");
        assert_eq!(passages[1].title, "RAG Systems Explained");
    }

    #[tokio::test]
    async fn test_local_k_above_availability_and_zero() {
        let kb = LocalKnowledgeBase::new();
        assert_eq!(kb.retrieve("q", 50).await.unwrap().len(), 5);
        assert!(kb.retrieve("q", 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_topk_splits_titles() {
        let body = json!({
            "topk": [
                { "long_text": "Federated learning | Training across silos.", "score": 21.0 },
                { "text": "No title here" },
                { "long_text": "Third | dropped by k" }
            ]
        });
        let passages = ColbertRetriever::parse_topk(&body, 2).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0], Passage::new("Federated learning", "Training across silos."));
        assert_eq!(passages[1], Passage::new("", "No title here"));
    }

    #[test]
    fn test_parse_topk_rejects_malformed() {
        let err = ColbertRetriever::parse_topk(&json!({"results": []}), 3).unwrap_err();
        assert!(matches!(err, RetrievalError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_colbert_unreachable_is_request_error() {
        let retriever = ColbertRetriever::new("http://127.0.0.1:1/search", 2).unwrap();
        let err = retriever.retrieve("q", 3).await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Request { .. } | RetrievalError::Timeout { .. }
        ));
    }

    #[test]
    fn test_create_retriever_by_mode() {
        let local = create_retriever(&RetrievalConfig::default()).unwrap();
        assert_eq!(local.name(), "local");

        let remote = create_retriever(&RetrievalConfig {
            mode: RetrievalMode::Colbert,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(remote.name(), "colbert");
    }
}
