//! Research programs composed from reasoning steps and retrieval.
//!
//! - [`AuraArchitect`]: rewrite, retrieve, read.
//! - [`AuraMultiHop`]: iterative query refinement over accumulated context.
//! - [`AuraAgent`]: bounded ReAct loop over registered tools.
//! - [`AuraReflector`]: generate-and-compare synthesis, pluggable into the architect.

pub mod agent;
pub mod multihop;
pub mod rag;
pub mod reflector;
pub mod synthesis;

pub use agent::{AuraAgent, FINISH_TOOL, RegisteredTool, ToolExecutor, render_trajectory};
pub use multihop::{AuraMultiHop, ContextAccumulator};
pub use rag::AuraArchitect;
pub use reflector::AuraReflector;
pub use synthesis::{DirectSynthesis, SynthesisStrategy};
