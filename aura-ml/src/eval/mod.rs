//! Evaluation harness: gold data, the research-quality judge, metrics and
//! batch evaluation.

pub mod dataset;
pub mod evaluator;
pub mod judge;
pub mod metric;

pub use dataset::{GOAL_FIELD, gold_dataset, gold_examples};
pub use evaluator::{EvaluationReport, Evaluator, ExampleResult};
pub use judge::{Assessment, ResearchQualityJudge, parse_score};
pub use metric::{Metric, ResearchQualityMetric};
