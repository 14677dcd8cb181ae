//! # AURA Tools
//!
//! Tools available to the AURA ReAct agent: a top-1 knowledge lookup and a
//! sandboxed arithmetic evaluator, plus the registry that wires them into an
//! [`AuraAgent`].

pub mod calculator;
pub mod registry;
pub mod retrieve;

use aura_core::error::{Result, ToolError};
use aura_core::modules::AuraAgent;
use aura_core::predict::StepExecutor;
use aura_core::retrieval::Retriever;
use registry::{Tool, ToolRegistry};
use std::sync::Arc;

pub use calculator::{ExpressionTool, eval_expression, evaluate_expression};
pub use retrieve::RetrieveTool;

/// Register the agent's built-in tools.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    retriever: Arc<dyn Retriever>,
) -> std::result::Result<(), ToolError> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(RetrieveTool::new(retriever)),
        Arc::new(ExpressionTool),
    ];
    for tool in tools {
        registry.register(tool)?;
    }
    Ok(())
}

/// An agent with the built-in toolset installed.
pub fn build_agent(
    executor: StepExecutor,
    retriever: Arc<dyn Retriever>,
    max_iters: usize,
) -> Result<AuraAgent> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, retriever)?;
    let mut agent = AuraAgent::new(executor, max_iters);
    registry.install(&mut agent)?;
    Ok(agent)
}
