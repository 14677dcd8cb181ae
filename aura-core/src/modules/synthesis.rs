//! Synthesis strategies for the RAG module.
//!
//! The final step of [`AuraArchitect`](super::AuraArchitect) is pluggable:
//! [`DirectSynthesis`] makes one chain-of-thought call, while
//! [`AuraReflector`](super::AuraReflector) generates several candidates and
//! compares them.

use crate::error::Result;
use crate::predict::{Predictor, StepExecutor, fields};
use crate::prediction::SynthesisPrediction;
use crate::signature::RESEARCH_SYNTHESIZER;
use crate::trace::Trace;
use crate::types::{Passage, format_passages};
use async_trait::async_trait;

/// Turns retrieved context into a structured insight.
#[async_trait]
pub trait SynthesisStrategy: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    async fn synthesize(
        &self,
        executor: &StepExecutor,
        context: &[Passage],
        research_goal: &str,
        trace: Option<&Trace>,
    ) -> Result<SynthesisPrediction>;

    fn predictors(&self) -> Vec<&Predictor>;

    fn predictors_mut(&mut self) -> Vec<&mut Predictor>;

    fn clone_box(&self) -> Box<dyn SynthesisStrategy>;
}

impl Clone for Box<dyn SynthesisStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for dyn SynthesisStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SynthesisStrategy({})", self.name())
    }
}

/// Single chain-of-thought `ResearchSynthesizer` call.
#[derive(Debug, Clone)]
pub struct DirectSynthesis {
    synthesize: Predictor,
}

impl DirectSynthesis {
    pub fn new() -> Self {
        Self {
            synthesize: Predictor::chain_of_thought("synthesize", &RESEARCH_SYNTHESIZER),
        }
    }
}

impl Default for DirectSynthesis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisStrategy for DirectSynthesis {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn synthesize(
        &self,
        executor: &StepExecutor,
        context: &[Passage],
        research_goal: &str,
        trace: Option<&Trace>,
    ) -> Result<SynthesisPrediction> {
        let inputs = fields([
            ("context", format_passages(context)),
            ("research_goal", research_goal.to_string()),
        ]);
        let mut out = executor.call(&self.synthesize, &inputs, trace).await?;
        Ok(SynthesisPrediction {
            rationale: out.remove("reasoning").unwrap_or_default(),
            structured_insight: out.remove("structured_insight").unwrap_or_default(),
        })
    }

    fn predictors(&self) -> Vec<&Predictor> {
        vec![&self.synthesize]
    }

    fn predictors_mut(&mut self) -> Vec<&mut Predictor> {
        vec![&mut self.synthesize]
    }

    fn clone_box(&self) -> Box<dyn SynthesisStrategy> {
        Box::new(self.clone())
    }
}
