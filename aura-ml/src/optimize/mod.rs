//! Compile-time prompt optimization.
//!
//! Optimizers search over predictor instructions and demonstrations, scoring
//! each candidate program by its pass rate on a validation split that must
//! not overlap the training split.

pub mod bootstrap;
pub mod mipro;
pub mod sampler;

use crate::artifact::CompiledProgram;
use crate::error::{MlError, Result};
use crate::eval::{Evaluator, Metric};
use aura_core::error::ValidationError;
use aura_core::example::Example;
use aura_core::program::Program;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use bootstrap::{BootstrapFewShot, BootstrapRandomSearch, RandomSearchConfig};
pub use mipro::{Mipro, MiproConfig};

/// Score of one evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub index: usize,
    pub label: String,
    /// Pass rate on the validation split.
    pub score: f64,
    pub mean_score: f64,
}

/// The winning program and the scores of everything tried.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome<P> {
    pub program: P,
    pub label: String,
    pub score: f64,
    pub candidates: Vec<CandidateScore>,
}

impl<P: Program> OptimizationOutcome<P> {
    pub fn to_artifact(&self, optimizer: &str) -> CompiledProgram {
        CompiledProgram::capture(&self.program, optimizer, Some(self.score))
    }
}

/// Reject a validation split that shares examples with the training split.
pub fn ensure_disjoint(trainset: &[Example], valset: &[Example]) -> Result<()> {
    let count = valset.iter().filter(|v| trainset.contains(v)).count();
    if count > 0 {
        return Err(ValidationError::SplitLeak { count }.into());
    }
    if valset.is_empty() {
        return Err(MlError::dataset("validation split is empty"));
    }
    Ok(())
}

/// Evaluate candidates with bounded concurrency and keep the best pass rate.
///
/// Ties go to the lower index. Candidates not yet started when `cancel`
/// fires are skipped; the best result so far is still returned.
pub async fn select_best<P>(
    candidates: Vec<(String, P)>,
    evaluator: &Evaluator,
    metric: &dyn Metric,
    valset: &[Example],
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<OptimizationOutcome<P>>
where
    P: Program,
{
    if candidates.is_empty() {
        return Err(MlError::optimization("no candidate programs to evaluate"));
    }

    let best: Mutex<Option<(usize, f64)>> = Mutex::new(None);
    let best_ref = &best;

    let scored: Vec<Option<CandidateScore>> = stream::iter(candidates.iter().enumerate())
        .map(|(index, (label, program))| async move {
            if cancel.is_cancelled() {
                debug!(index, "Skipping candidate after cancellation");
                return None;
            }
            let report = evaluator.evaluate(program, metric, valset).await;
            let score = report.pass_rate;

            let mut guard = best_ref.lock().await;
            let replace = match *guard {
                None => true,
                Some((best_index, best_score)) => {
                    score > best_score || (score == best_score && index < best_index)
                }
            };
            if replace {
                *guard = Some((index, score));
            }
            info!(index, label = %label, score, new_best = replace, "Evaluated candidate");

            Some(CandidateScore {
                index,
                label: label.clone(),
                score,
                mean_score: report.mean_score,
            })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut scores: Vec<CandidateScore> = scored.into_iter().flatten().collect();
    scores.sort_by_key(|c| c.index);

    let Some((index, score)) = best.into_inner() else {
        return Err(MlError::Cancelled);
    };
    if cancel.is_cancelled() {
        warn!(evaluated = scores.len(), "Optimization cancelled; keeping best candidate so far");
    }
    let (label, program) = candidates
        .into_iter()
        .nth(index)
        .ok_or_else(|| MlError::optimization("best candidate index out of range"))?;

    Ok(OptimizationOutcome {
        program,
        label,
        score,
        candidates: scores,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use aura_core::error::{AuraError, ErrorKind};

    #[test]
    fn test_overlapping_splits_rejected() {
        let train = examples(&["alpha", "beta"]);
        let dev = examples(&["beta", "gamma"]);
        match ensure_disjoint(&train, &dev).unwrap_err() {
            MlError::Core(err @ AuraError::Validation(_)) => {
                assert_eq!(err.kind(), ErrorKind::Validation);
                assert!(err.to_string().contains("1 example"));
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert!(ensure_disjoint(&train, &examples(&["gamma"])).is_ok());
        assert!(ensure_disjoint(&train, &[]).is_err());
    }

    #[tokio::test]
    async fn test_select_best_prefers_earlier_on_ties() {
        let program = architect(echo_provider());
        let candidates = vec![
            ("first".to_string(), program.clone()),
            ("second".to_string(), program.clone()),
            ("third".to_string(), program),
        ];
        let outcome = select_best(
            candidates,
            &Evaluator::new(2),
            &KeywordMetric,
            &examples(&["alpha question", "beta question"]),
            3,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.label, "first");
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_select_best_cancelled_up_front() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = select_best(
            vec![("only".to_string(), architect(echo_provider()))],
            &Evaluator::default(),
            &KeywordMetric,
            &examples(&["alpha"]),
            1,
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(MlError::Cancelled)));
    }
}
