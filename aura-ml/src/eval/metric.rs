//! Metrics over (example, prediction) pairs.
//!
//! A metric never fails: anything that goes wrong while judging counts as a
//! failing example with score `0.0`.

use super::dataset::GOAL_FIELD;
use super::judge::ResearchQualityJudge;
use async_trait::async_trait;
use aura_core::example::Example;
use aura_core::prediction::Prediction;
use tracing::{debug, warn};

/// Context given to the judge when the prediction carries none.
pub const NO_CONTEXT: &str = "No context provided.";

/// Default pass threshold on the 1 to 5 scale.
pub const PASS_THRESHOLD: f64 = 4.0;

#[async_trait]
pub trait Metric: Send + Sync {
    /// Numeric score for one prediction; `0.0` when scoring failed.
    async fn validate_with_score(&self, example: &Example, prediction: &Prediction) -> f64;

    /// Whether a score counts as a pass.
    fn passes(&self, score: f64) -> bool;

    async fn validate(&self, example: &Example, prediction: &Prediction) -> bool {
        let score = self.validate_with_score(example, prediction).await;
        self.passes(score)
    }
}

/// Judge-backed research quality metric: pass when the judge scores ≥ threshold.
#[derive(Debug, Clone)]
pub struct ResearchQualityMetric {
    judge: ResearchQualityJudge,
    threshold: f64,
}

impl ResearchQualityMetric {
    pub fn new(judge: ResearchQualityJudge) -> Self {
        Self::with_threshold(judge, PASS_THRESHOLD)
    }

    pub fn with_threshold(judge: ResearchQualityJudge, threshold: f64) -> Self {
        Self { judge, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[async_trait]
impl Metric for ResearchQualityMetric {
    async fn validate_with_score(&self, example: &Example, prediction: &Prediction) -> f64 {
        let Some(goal) = example.get(GOAL_FIELD) else {
            warn!("Metric error: example has no {GOAL_FIELD}");
            return 0.0;
        };
        let context = prediction
            .context_text()
            .unwrap_or_else(|| NO_CONTEXT.to_string());
        let insight = prediction.insight_text();

        match self.judge.judge(&context, goal, &insight).await {
            Ok(assessment) => {
                debug!(goal, score = assessment.score, "Scored prediction");
                assessment.score
            }
            Err(e) => {
                warn!(goal, error = %e, "Metric error");
                0.0
            }
        }
    }

    fn passes(&self, score: f64) -> bool {
        score >= self.threshold
    }
}
