//! Few-shot bootstrapping and random search over bootstrapped demo sets.

use super::{OptimizationOutcome, ensure_disjoint, select_best};
use crate::error::Result;
use crate::eval::{Evaluator, GOAL_FIELD, Metric};
use aura_core::config::OptimizerConfig;
use aura_core::example::Example;
use aura_core::program::Program;
use aura_core::trace::Trace;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Demonstrations keyed by predictor name.
pub type DemoSet = BTreeMap<String, Vec<Example>>;

/// Collects demonstrations from successful teacher runs, topped up with raw
/// labeled examples.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapFewShot {
    pub max_bootstrapped_demos: usize,
    pub max_labeled_demos: usize,
}

impl BootstrapFewShot {
    pub fn new(max_bootstrapped_demos: usize, max_labeled_demos: usize) -> Self {
        Self {
            max_bootstrapped_demos,
            max_labeled_demos,
        }
    }

    /// Demo sets for every predictor of `student`.
    ///
    /// The teacher (the student itself when `None`) runs over `trainset` in
    /// order; each run the metric accepts contributes its trace steps as demos
    /// until every predictor holds `max_bootstrapped_demos`. Each predictor is
    /// then filled with unused training examples up to `max_labeled_demos`.
    pub async fn bootstrap<P>(
        &self,
        student: &P,
        teacher: Option<&P>,
        trainset: &[Example],
        metric: &dyn Metric,
    ) -> DemoSet
    where
        P: Program,
    {
        let teacher = teacher.unwrap_or(student);
        let names: Vec<String> = student
            .named_predictors()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        let mut demos: DemoSet = names.iter().map(|n| (n.clone(), Vec::new())).collect();
        let mut used = vec![false; trainset.len()];

        for (index, example) in trainset.iter().enumerate() {
            let full = demos.values().all(|d| d.len() >= self.max_bootstrapped_demos);
            if full {
                break;
            }
            let Some(goal) = example.get(GOAL_FIELD) else {
                continue;
            };

            let trace = Trace::new();
            let prediction = match teacher.forward(goal, Some(&trace)).await {
                Ok(p) => p,
                Err(e) => {
                    debug!(index, error = %e, "Teacher run failed; skipping example");
                    continue;
                }
            };
            if !metric.validate(example, &prediction).await {
                continue;
            }

            used[index] = true;
            for entry in trace.entries() {
                if let Some(set) = demos.get_mut(&entry.predictor)
                    && set.len() < self.max_bootstrapped_demos
                {
                    set.push(entry.to_demo());
                }
            }
        }

        let unused: Vec<&Example> = trainset
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(ex, _)| ex)
            .collect();
        for set in demos.values_mut() {
            let room = self.max_labeled_demos.saturating_sub(set.len());
            set.extend(unused.iter().take(room).map(|ex| (*ex).clone()));
        }

        debug!(
            demos = ?demos.iter().map(|(k, v)| (k.as_str(), v.len())).collect::<Vec<_>>(),
            "Bootstrapped demonstrations"
        );
        demos
    }

    /// A copy of `student` carrying freshly bootstrapped demos.
    pub async fn compile<P>(
        &self,
        student: &P,
        teacher: Option<&P>,
        trainset: &[Example],
        metric: &dyn Metric,
    ) -> P
    where
        P: Program + Clone,
    {
        let demos = self.bootstrap(student, teacher, trainset, metric).await;
        let mut compiled = student.clone();
        apply_demos(&mut compiled, &demos);
        compiled
    }
}

/// Replace each predictor's demos with its entry in `demos` (empty if absent).
pub fn apply_demos<P: Program + ?Sized>(program: &mut P, demos: &DemoSet) {
    for predictor in program.named_predictors_mut() {
        let set = demos.get(predictor.name()).cloned().unwrap_or_default();
        predictor.set_demos(set);
    }
}

#[derive(Debug, Clone)]
pub struct RandomSearchConfig {
    pub max_bootstrapped_demos: usize,
    pub max_labeled_demos: usize,
    pub num_candidate_programs: usize,
    pub seed: u64,
    /// Candidates evaluated at once.
    pub concurrency: usize,
}

impl Default for RandomSearchConfig {
    fn default() -> Self {
        Self::from(&OptimizerConfig::default())
    }
}

impl From<&OptimizerConfig> for RandomSearchConfig {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            max_bootstrapped_demos: config.max_bootstrapped_demos,
            max_labeled_demos: config.max_labeled_demos,
            num_candidate_programs: config.num_candidate_programs,
            seed: config.seed,
            concurrency: config.concurrency,
        }
    }
}

/// Bootstrap several candidate programs and keep the one with the best
/// validation pass rate.
///
/// Candidates, in order: zero-shot, labeled demos only, bootstrapped on the
/// training set as given, then `num_candidate_programs` bootstraps over seeded
/// shuffles with a random demo budget.
#[derive(Debug, Clone)]
pub struct BootstrapRandomSearch {
    config: RandomSearchConfig,
    evaluator: Evaluator,
}

impl BootstrapRandomSearch {
    pub fn new(config: RandomSearchConfig, evaluator: Evaluator) -> Self {
        Self { config, evaluator }
    }

    pub fn config(&self) -> &RandomSearchConfig {
        &self.config
    }

    #[instrument(skip_all, fields(program = student.name(), train = trainset.len(), dev = valset.len()))]
    pub async fn compile<P>(
        &self,
        student: &P,
        teacher: Option<&P>,
        trainset: &[Example],
        valset: &[Example],
        metric: &dyn Metric,
        cancel: &CancellationToken,
    ) -> Result<OptimizationOutcome<P>>
    where
        P: Program + Clone,
    {
        ensure_disjoint(trainset, valset)?;
        let cfg = &self.config;

        let mut zero_shot = student.clone();
        zero_shot.reset();
        let mut candidates = vec![("zero-shot".to_string(), zero_shot)];

        if !cancel.is_cancelled() {
            let labeled = BootstrapFewShot::new(0, cfg.max_labeled_demos)
                .compile(student, teacher, trainset, metric)
                .await;
            candidates.push(("labeled-only".to_string(), labeled));
        }
        if !cancel.is_cancelled() {
            let unshuffled = BootstrapFewShot::new(cfg.max_bootstrapped_demos, cfg.max_labeled_demos)
                .compile(student, teacher, trainset, metric)
                .await;
            candidates.push(("bootstrap".to_string(), unshuffled));
        }

        for i in 0..cfg.num_candidate_programs {
            if cancel.is_cancelled() {
                break;
            }
            let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(i as u64));
            let mut shuffled = trainset.to_vec();
            shuffled.shuffle(&mut rng);
            let budget = rng.gen_range(1..=cfg.max_bootstrapped_demos.max(1));

            let program = BootstrapFewShot::new(budget, cfg.max_labeled_demos)
                .compile(student, teacher, &shuffled, metric)
                .await;
            candidates.push((format!("bootstrap-shuffled-{i} (budget {budget})"), program));
        }

        info!(candidates = candidates.len(), "Evaluating candidate programs");
        select_best(
            candidates,
            &self.evaluator,
            metric,
            valset,
            cfg.concurrency,
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::error::MlError;
    use aura_core::error::AuraError;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_bootstrap_collects_trace_demos_then_labels() {
        let program = architect(echo_provider());
        let train = examples(&["alpha one", "beta two", "gamma three"]);
        let demos = BootstrapFewShot::new(1, 3)
            .bootstrap(&program, None, &train, &KeywordMetric)
            .await;

        let query_demos = &demos["generate_query"];
        assert_eq!(query_demos.len(), 3);
        // first from the trace, the rest raw labeled examples
        assert_eq!(query_demos[0].get("search_query"), Some("alpha one"));
        assert!(query_demos[0].is_input("research_goal"));
        assert_eq!(query_demos[1].get("research_goal"), Some("beta two"));
        assert_eq!(query_demos[1].get("search_query"), None);
        assert_eq!(demos["synthesize"].len(), 3);
    }

    #[tokio::test]
    async fn test_zero_budgets_give_no_demos() {
        let program = architect(echo_provider());
        let compiled = BootstrapFewShot::new(0, 0)
            .compile(&program, None, &examples(&["alpha"]), &KeywordMetric)
            .await;
        assert!(compiled.named_predictors().iter().all(|p| p.demos().is_empty()));
    }

    #[tokio::test]
    async fn test_random_search_is_seeded_and_keeps_first_best() {
        let config = RandomSearchConfig {
            max_bootstrapped_demos: 2,
            max_labeled_demos: 2,
            num_candidate_programs: 2,
            seed: 7,
            concurrency: 2,
        };
        let search = BootstrapRandomSearch::new(config, Evaluator::new(2));
        let train = examples(&["alpha one", "beta two", "gamma three"]);
        let dev = examples(&["delta four", "epsilon five"]);

        let outcome = search
            .compile(
                &architect(echo_provider()),
                None,
                &train,
                &dev,
                &KeywordMetric,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.candidates.len(), 5);
        assert_eq!(outcome.label, "zero-shot");
        assert_eq!(outcome.score, 1.0);
        let labels: Vec<&str> = outcome.candidates.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(&labels[..3], &["zero-shot", "labeled-only", "bootstrap"]);
    }

    #[tokio::test]
    async fn test_random_search_rejects_leaked_split() {
        let search = BootstrapRandomSearch::new(RandomSearchConfig::default(), Evaluator::default());
        let train = examples(&["alpha"]);
        let err = search
            .compile(
                &architect(echo_provider()),
                None,
                &train,
                &train,
                &KeywordMetric,
                &CancellationToken::new(),
            )
            .await
            .err()
            .expect("expected compile to fail");
        assert!(matches!(err, MlError::Core(AuraError::Validation(_))));
    }
}
