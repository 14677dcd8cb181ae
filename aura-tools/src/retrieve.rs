//! Knowledge lookup tool: the single best passage for a query.

use crate::registry::Tool;
use async_trait::async_trait;
use aura_core::error::ToolError;
use aura_core::retrieval::Retriever;
use aura_core::types::ToolOutput;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const TOOL_NAME: &str = "retrieve_top1";

/// Observation returned when retrieval finds nothing.
pub const NO_INFO: &str = "No info found.";

pub struct RetrieveTool {
    retriever: Arc<dyn Retriever>,
    timeout: Duration,
}

impl RetrieveTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Searches the knowledge base and returns the most relevant passage."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to search for" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.to_string(),
                reason: "missing required 'query' parameter".to_string(),
            })?;

        let passages = self
            .retriever
            .retrieve(query, 1)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: TOOL_NAME.to_string(),
                message: e.to_string(),
            })?;
        debug!(query, found = passages.len(), backend = self.retriever.name(), "Top-1 lookup");

        Ok(ToolOutput::text(
            passages
                .into_iter()
                .next()
                .map(|p| p.text)
                .unwrap_or_else(|| NO_INFO.to_string()),
        ))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
