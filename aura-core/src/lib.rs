//! # AURA Core
//!
//! Core library for AURA research synthesis pipelines.
//! Provides typed signatures, the reasoning step executor, LLM providers,
//! retrieval backends, and the research programs built on top of them.

pub mod adapter;
pub mod brain;
pub mod config;
pub mod error;
pub mod example;
pub mod modules;
pub mod predict;
pub mod prediction;
pub mod program;
pub mod providers;
pub mod retrieval;
pub mod signature;
pub mod trace;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{AuraConfig, LlmConfig, PipelineConfig, RetrievalMode, load_config};
pub use error::{AuraError, ErrorKind, Result};
pub use example::{Example, FieldMap};
pub use modules::{AuraAgent, AuraArchitect, AuraMultiHop, AuraReflector, RegisteredTool};
pub use predict::{Predictor, PredictorState, StepExecutor};
pub use prediction::Prediction;
pub use program::{Program, ProgramState};
pub use providers::create_provider;
pub use retrieval::{ColbertRetriever, LocalKnowledgeBase, Retriever, create_retriever};
pub use signature::{Signature, SignatureId};
pub use trace::Trace;
pub use types::{CompletionRequest, CompletionResponse, Message, Passage, Role, ToolDefinition, ToolOutput};
