//! Batch evaluation of a program over a dataset.

use super::dataset::GOAL_FIELD;
use super::metric::Metric;
use aura_core::example::Example;
use aura_core::program::Program;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome for one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleResult {
    pub index: usize,
    pub goal: String,
    pub score: f64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub program: String,
    pub results: Vec<ExampleResult>,
    pub mean_score: f64,
    pub pass_rate: f64,
}

impl EvaluationReport {
    fn from_results(program: &str, mut results: Vec<ExampleResult>) -> Self {
        results.sort_by_key(|r| r.index);
        let total = results.len();
        let (mean_score, pass_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                results.iter().map(|r| r.score).sum::<f64>() / total as f64,
                results.iter().filter(|r| r.passed).count() as f64 / total as f64,
            )
        };
        Self {
            program: program.to_string(),
            results,
            mean_score,
            pass_rate,
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn errors(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

/// Runs a program on every example and scores it, with bounded concurrency.
/// A failing example is recorded and never aborts the batch.
#[derive(Debug, Clone)]
pub struct Evaluator {
    concurrency: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Evaluator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn evaluate<P>(
        &self,
        program: &P,
        metric: &dyn Metric,
        examples: &[Example],
    ) -> EvaluationReport
    where
        P: Program + ?Sized,
    {
        let results: Vec<ExampleResult> = stream::iter(examples.iter().enumerate())
            .map(|(index, example)| async move {
                let goal = example.get(GOAL_FIELD).unwrap_or_default().to_string();
                if goal.is_empty() {
                    return ExampleResult {
                        index,
                        goal,
                        score: 0.0,
                        passed: false,
                        error: Some(format!("example has no {GOAL_FIELD}")),
                    };
                }
                match program.forward(&goal, None).await {
                    Ok(prediction) => {
                        let score = metric.validate_with_score(example, &prediction).await;
                        ExampleResult {
                            index,
                            goal,
                            score,
                            passed: metric.passes(score),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Program failed on example");
                        ExampleResult {
                            index,
                            goal,
                            score: 0.0,
                            passed: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = EvaluationReport::from_results(program.name(), results);
        info!(
            program = %report.program,
            examples = report.results.len(),
            mean_score = report.mean_score,
            pass_rate = report.pass_rate,
            "Evaluation complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aura_core::error::{AuraError, LlmError, Result};
    use aura_core::predict::Predictor;
    use aura_core::prediction::{Prediction, SynthesisPrediction};
    use aura_core::trace::Trace;

    /// Echoes the goal; fails on goals containing "fail".
    struct EchoProgram;

    #[async_trait]
    impl Program for EchoProgram {
        fn name(&self) -> &str {
            "echo"
        }

        async fn forward(&self, goal: &str, _trace: Option<&Trace>) -> Result<Prediction> {
            if goal.contains("fail") {
                return Err(AuraError::from(LlmError::Timeout { timeout_secs: 1 }));
            }
            Ok(Prediction::Synthesis(SynthesisPrediction {
                rationale: String::new(),
                structured_insight: goal.to_string(),
            }))
        }

        fn named_predictors(&self) -> Vec<&Predictor> {
            Vec::new()
        }

        fn named_predictors_mut(&mut self) -> Vec<&mut Predictor> {
            Vec::new()
        }
    }

    /// Scores by insight length, capped at 5.
    struct LengthMetric;

    #[async_trait]
    impl Metric for LengthMetric {
        async fn validate_with_score(&self, _example: &Example, prediction: &Prediction) -> f64 {
            (prediction.insight_text().len() as f64).min(5.0)
        }

        fn passes(&self, score: f64) -> bool {
            score >= 4.0
        }
    }

    fn ex(goal: &str) -> Example {
        Example::new().with(GOAL_FIELD, goal).with_inputs(&[GOAL_FIELD])
    }

    #[tokio::test]
    async fn test_report_aggregates_in_order() {
        let examples = vec![ex("abcdef"), ex("ab"), ex("please fail"), Example::new()];
        let report = Evaluator::new(2)
            .evaluate(&EchoProgram, &LengthMetric, &examples)
            .await;

        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.errors(), 2);
        assert_eq!(report.pass_rate, 0.25);
        assert_eq!(report.mean_score, (5.0 + 2.0) / 4.0);
        assert!(report.results[2].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_dataset() {
        let report = Evaluator::default().evaluate(&EchoProgram, &LengthMetric, &[]).await;
        assert_eq!(report.pass_rate, 0.0);
        assert!(report.results.is_empty());
    }
}
