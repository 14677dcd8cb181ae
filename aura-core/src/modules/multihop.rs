//! Iterative multi-hop retrieval.
//!
//! Each hop writes a new query from the context gathered so far, retrieves
//! `k` passages and appends the ones not seen before. After `max_hops` hops a
//! final step answers over the whole accumulated context.

use crate::error::{AuraError, Result, ValidationError};
use crate::predict::{Predictor, StepExecutor, fields};
use crate::prediction::{MultiHopPrediction, Prediction, join_passages};
use crate::program::Program;
use crate::retrieval::Retriever;
use crate::signature::{FINAL_RESEARCHER, HOP_QUERY_GENERATOR};
use crate::trace::Trace;
use crate::types::Passage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Context shown to the query generator before the first retrieval.
pub const EMPTY_CONTEXT: &str = "No context yet.";

/// Ordered passages, deduplicated by exact text; first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextAccumulator {
    passages: Vec<Passage>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append passages whose text is not already present. Returns how many were added.
    pub fn extend(&mut self, incoming: impl IntoIterator<Item = Passage>) -> usize {
        let before = self.passages.len();
        for passage in incoming {
            if !self.passages.iter().any(|p| p.text == passage.text) {
                self.passages.push(passage);
            }
        }
        self.passages.len() - before
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Prompt rendering; the placeholder when nothing has been gathered.
    pub fn render(&self) -> String {
        if self.passages.is_empty() {
            EMPTY_CONTEXT.to_string()
        } else {
            join_passages(&self.passages)
        }
    }

    pub fn into_passages(self) -> Vec<Passage> {
        self.passages
    }
}

#[derive(Clone)]
pub struct AuraMultiHop {
    executor: StepExecutor,
    retriever: Arc<dyn Retriever>,
    max_hops: usize,
    k: usize,
    generate_query: Predictor,
    generate_answer: Predictor,
}

impl AuraMultiHop {
    pub fn new(
        executor: StepExecutor,
        retriever: Arc<dyn Retriever>,
        max_hops: usize,
        k: usize,
    ) -> Result<Self> {
        if max_hops == 0 {
            return Err(ValidationError::InvalidValue {
                field: "max_hops".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(Self {
            executor,
            retriever,
            max_hops,
            k,
            generate_query: Predictor::chain_of_thought("generate_query", &HOP_QUERY_GENERATOR),
            generate_answer: Predictor::chain_of_thought("generate_answer", &FINAL_RESEARCHER),
        })
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    pub async fn run(&self, question: &str, trace: Option<&Trace>) -> Result<MultiHopPrediction> {
        let mut context = ContextAccumulator::new();
        let mut hop_queries = Vec::with_capacity(self.max_hops);

        for hop in 1..=self.max_hops {
            let stage = format!("hop {hop}");
            let inputs = fields([("context", context.render()), ("question", question.to_string())]);
            let mut out = self
                .executor
                .call(&self.generate_query, &inputs, trace)
                .await
                .map_err(|e| e.at_stage(format!("{stage} query generation")))?;
            let query = out.remove("search_query").unwrap_or_default();

            let passages = self
                .retriever
                .retrieve(&query, self.k)
                .await
                .map_err(|e| AuraError::from(e).at_stage(format!("{stage} retrieval")))?;
            let added = context.extend(passages);
            info!(hop, query = %query, added, total = context.len(), "Completed retrieval hop");
            hop_queries.push(query);
        }

        let inputs = fields([
            ("context", join_passages(context.passages())),
            ("question", question.to_string()),
        ]);
        let mut out = self
            .executor
            .call(&self.generate_answer, &inputs, trace)
            .await
            .map_err(|e| e.at_stage("final synthesis"))?;
        debug!(passages = context.len(), "Synthesized multi-hop answer");

        Ok(MultiHopPrediction {
            context: context.into_passages(),
            answer: out.remove("answer").unwrap_or_default(),
            hop_queries,
        })
    }
}

#[async_trait]
impl Program for AuraMultiHop {
    fn name(&self) -> &str {
        "aura_multihop"
    }

    async fn forward(&self, goal: &str, trace: Option<&Trace>) -> Result<Prediction> {
        self.run(goal, trace).await.map(Prediction::MultiHop)
    }

    fn named_predictors(&self) -> Vec<&Predictor> {
        vec![&self.generate_query, &self.generate_answer]
    }

    fn named_predictors_mut(&mut self) -> Vec<&mut Predictor> {
        vec![&mut self.generate_query, &mut self.generate_answer]
    }
}
