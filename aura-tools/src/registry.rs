//! Tool Registry: manages tool registration, lookup, and execution.
//!
//! Tools are registered at startup. The registry provides tool definitions for
//! the agent prompt and executes tool calls with a per-tool timeout. It can
//! hand its tools to an [`AuraAgent`] as [`RegisteredTool`]s.

use async_trait::async_trait;
use aura_core::error::ToolError;
use aura_core::modules::{AuraAgent, RegisteredTool};
use aura_core::types::{ToolDefinition, ToolOutput};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Run a tool under its own timeout.
async fn execute_with_timeout(
    tool: &dyn Tool,
    args: serde_json::Value,
) -> Result<ToolOutput, ToolError> {
    let timeout = tool.timeout();
    info!(tool = tool.name(), timeout_secs = timeout.as_secs(), "Executing tool");

    match tokio::time::timeout(timeout, tool.execute(args)).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::Timeout {
            name: tool.name().to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// The tool registry holds all registered tools, ordered by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Returns error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool definitions, in name order.
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name with the given arguments, applying timeout.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;
        execute_with_timeout(tool.as_ref(), args).await
    }

    /// Wrap every tool as an agent-facing [`RegisteredTool`] that keeps the timeout.
    pub fn registered_tools(&self) -> Vec<RegisteredTool> {
        self.tools
            .values()
            .map(|tool| {
                let tool = Arc::clone(tool);
                RegisteredTool {
                    definition: tool.definition(),
                    executor: Arc::new(move |args| {
                        let tool = Arc::clone(&tool);
                        Box::pin(async move { execute_with_timeout(tool.as_ref(), args).await })
                    }),
                }
            })
            .collect()
    }

    /// Register every tool on the agent.
    pub fn install(&self, agent: &mut AuraAgent) -> Result<(), ToolError> {
        for tool in self.registered_tools() {
            agent.register_tool(tool)?;
        }
        Ok(())
    }
}
