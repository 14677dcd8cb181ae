//! Standard rewrite-retrieve-read pipeline.

use super::synthesis::{DirectSynthesis, SynthesisStrategy};
use crate::error::{AuraError, Result};
use crate::predict::{Predictor, StepExecutor, fields};
use crate::prediction::{Prediction, ResearchPrediction};
use crate::program::Program;
use crate::retrieval::Retriever;
use crate::signature::GENERATE_SEARCH_QUERY;
use crate::trace::Trace;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Query generation, retrieval of `k` passages, then synthesis.
#[derive(Clone)]
pub struct AuraArchitect {
    executor: StepExecutor,
    retriever: Arc<dyn Retriever>,
    k: usize,
    generate_query: Predictor,
    synthesis: Box<dyn SynthesisStrategy>,
}

impl AuraArchitect {
    /// RAG with direct single-call synthesis.
    pub fn new(executor: StepExecutor, retriever: Arc<dyn Retriever>, k: usize) -> Self {
        Self::with_strategy(executor, retriever, k, Box::new(DirectSynthesis::new()))
    }

    /// RAG with an injected synthesis strategy, e.g. the reflector.
    pub fn with_strategy(
        executor: StepExecutor,
        retriever: Arc<dyn Retriever>,
        k: usize,
        synthesis: Box<dyn SynthesisStrategy>,
    ) -> Self {
        Self {
            executor,
            retriever,
            k,
            generate_query: Predictor::chain_of_thought("generate_query", &GENERATE_SEARCH_QUERY),
            synthesis,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn strategy_name(&self) -> &'static str {
        self.synthesis.name()
    }

    /// Same program bound to another executor (e.g. a teacher model).
    pub fn with_executor(&self, executor: StepExecutor) -> Self {
        Self {
            executor,
            ..self.clone()
        }
    }

    #[instrument(skip(self, trace), fields(k = self.k, strategy = self.synthesis.name()))]
    pub async fn run(&self, research_goal: &str, trace: Option<&Trace>) -> Result<ResearchPrediction> {
        let mut query = self
            .executor
            .call(
                &self.generate_query,
                &fields([("research_goal", research_goal)]),
                trace,
            )
            .await
            .map_err(|e| e.at_stage("query generation"))?;
        let search_query = query.remove("search_query").unwrap_or_default();
        info!(search_query = %search_query, "Generated search query");

        let context = self
            .retriever
            .retrieve(&search_query, self.k)
            .await
            .map_err(|e| AuraError::from(e).at_stage("retrieval"))?;
        info!(passages = context.len(), "Retrieved context");

        let synthesis = self
            .synthesis
            .synthesize(&self.executor, &context, research_goal, trace)
            .await
            .map_err(|e| e.at_stage("synthesis"))?;

        Ok(ResearchPrediction {
            query_rationale: query.remove("reasoning").unwrap_or_default(),
            search_query,
            context,
            synthesis_rationale: synthesis.rationale,
            structured_insight: synthesis.structured_insight,
        })
    }
}

#[async_trait]
impl Program for AuraArchitect {
    fn name(&self) -> &str {
        "aura_architect"
    }

    async fn forward(&self, goal: &str, trace: Option<&Trace>) -> Result<Prediction> {
        self.run(goal, trace).await.map(Prediction::Research)
    }

    fn named_predictors(&self) -> Vec<&Predictor> {
        let mut predictors = vec![&self.generate_query];
        predictors.extend(self.synthesis.predictors());
        predictors
    }

    fn named_predictors_mut(&mut self) -> Vec<&mut Predictor> {
        let mut predictors = vec![&mut self.generate_query];
        predictors.extend(self.synthesis.predictors_mut());
        predictors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{REASONING_PLACEHOLDER, format_reply, signature_of};
    use crate::brain::{Brain, MockLlmProvider};
    use crate::error::{ErrorKind, LlmError, RetrievalError};
    use crate::retrieval::LocalKnowledgeBase;
    use crate::signature::SignatureId;
    use crate::types::Passage;

    fn deterministic_provider() -> MockLlmProvider {
        MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::GenerateSearchQuery) => format_reply(&[
                    ("reasoning", "Target the mechanism."),
                    ("search_query", "knowledge distillation teacher student"),
                ]),
                Some(SignatureId::ResearchSynthesizer) => format_reply(&[
                    ("reasoning", "Combine sources."),
                    ("structured_insight", "Distillation transfers knowledge [1]."),
                ]),
                _ => String::new(),
            })
        })
    }

    fn architect(provider: MockLlmProvider, k: usize) -> AuraArchitect {
        let exec = StepExecutor::new(Brain::new(Arc::new(provider)));
        AuraArchitect::new(exec, Arc::new(LocalKnowledgeBase::new()), k)
    }

    #[tokio::test]
    async fn test_forward_populates_all_fields() {
        let program = architect(deterministic_provider(), 3);
        let pred = program.run("Explain knowledge distillation.", None).await.unwrap();
        assert_eq!(pred.search_query, "knowledge distillation teacher student");
        assert_eq!(pred.query_rationale, "Target the mechanism.");
        assert_eq!(pred.context.len(), 3);
        assert_eq!(pred.synthesis_rationale, "Combine sources.");
        assert_eq!(pred.structured_insight, "Distillation transfers knowledge [1].");
    }

    #[tokio::test]
    async fn test_forward_is_idempotent_with_deterministic_model() {
        let program = architect(deterministic_provider(), 2);
        let a = program.forward("Explain knowledge distillation.", None).await.unwrap();
        let b = program.forward("Explain knowledge distillation.", None).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_missing_rationale_uses_placeholder() {
        let provider = MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::GenerateSearchQuery) => format_reply(&[("search_query", "q")]),
                _ => format_reply(&[("structured_insight", "i")]),
            })
        });
        let pred = architect(provider, 1).run("goal", None).await.unwrap();
        assert_eq!(pred.query_rationale, REASONING_PLACEHOLDER);
        assert_eq!(pred.synthesis_rationale, REASONING_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_provider_failure_names_stage() {
        let provider = MockLlmProvider::new();
        provider.queue_error(LlmError::Timeout { timeout_secs: 30 });
        let err = architect(provider, 3).run("goal", None).await.unwrap_err();
        assert_eq!(err.stage(), Some("query generation"));
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> std::result::Result<Vec<Passage>, RetrievalError> {
            Err(RetrievalError::Timeout { timeout_secs: 5 })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_retrieval_failure_names_stage() {
        let exec = StepExecutor::new(Brain::new(Arc::new(deterministic_provider())));
        let program = AuraArchitect::new(exec, Arc::new(FailingRetriever), 3);
        let err = program.run("goal", None).await.unwrap_err();
        assert_eq!(err.stage(), Some("retrieval"));
    }

    #[tokio::test]
    async fn test_trace_records_both_steps() {
        let program = architect(deterministic_provider(), 3);
        let trace = Trace::new();
        program.forward("goal", Some(&trace)).await.unwrap();
        let names: Vec<String> = trace.entries().into_iter().map(|e| e.predictor).collect();
        assert_eq!(names, vec!["generate_query", "synthesize"]);
    }

    #[test]
    fn test_named_predictors() {
        let program = architect(MockLlmProvider::new(), 3);
        let names: Vec<&str> = program.named_predictors().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["generate_query", "synthesize"]);
    }
}
