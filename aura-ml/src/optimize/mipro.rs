//! Joint instruction and demonstration search.
//!
//! For every predictor MIPRO prepares a list of instruction candidates (the
//! original plus model-written proposals) and a list of demo sets (none,
//! labeled only, then seeded bootstraps). Each trial picks one of each per
//! predictor with a [`TpeSampler`], scores the assembled program on the
//! validation split, and feeds the score back to the sampler.

use super::bootstrap::{BootstrapFewShot, DemoSet, apply_demos};
use super::sampler::TpeSampler;
use super::{CandidateScore, OptimizationOutcome, ensure_disjoint};
use crate::error::{MlError, Result};
use crate::eval::{Evaluator, Metric};
use aura_core::config::OptimizerConfig;
use aura_core::example::Example;
use aura_core::predict::{Predictor, StepExecutor, fields};
use aura_core::program::Program;
use aura_core::signature::PROPOSE_INSTRUCTION;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Stylistic directions cycled through when proposing instructions.
pub const PROPOSAL_HINTS: &[&str] = &[
    "Be concise and direct.",
    "Emphasize grounding every claim in the provided context.",
    "Ask for a clearly sectioned, structured answer.",
    "Stress faithfulness: never add facts absent from the context.",
    "Encourage discussing limitations and open problems.",
    "Write as a senior researcher briefing a colleague.",
];

/// Demonstrations shown to the proposer, per predictor.
const PROPOSAL_DEMOS: usize = 3;

#[derive(Debug, Clone)]
pub struct MiproConfig {
    /// Instruction candidates and demo sets per predictor.
    pub num_candidates: usize,
    pub num_trials: usize,
    pub max_bootstrapped_demos: usize,
    pub max_labeled_demos: usize,
    pub init_temperature: f32,
    pub seed: u64,
}

impl Default for MiproConfig {
    fn default() -> Self {
        Self::from(&OptimizerConfig::default())
    }
}

impl From<&OptimizerConfig> for MiproConfig {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            num_candidates: config.mipro_num_candidates,
            num_trials: config.mipro_num_trials,
            max_bootstrapped_demos: config.mipro_max_bootstrapped_demos,
            max_labeled_demos: config.mipro_max_labeled_demos,
            init_temperature: config.mipro_init_temperature,
            seed: config.seed,
        }
    }
}

/// Per-predictor choice in one trial: (instruction index, demo set index).
type TrialChoice = Vec<(usize, usize)>;

pub struct Mipro {
    config: MiproConfig,
    evaluator: Evaluator,
    proposer: StepExecutor,
    propose: Predictor,
}

impl Mipro {
    /// `proposer` writes instruction candidates; it is run at the configured
    /// initial temperature.
    pub fn new(config: MiproConfig, evaluator: Evaluator, proposer: StepExecutor) -> Self {
        let proposer = proposer.with_temperature(config.init_temperature);
        Self {
            config,
            evaluator,
            proposer,
            propose: Predictor::new("propose_instruction", &PROPOSE_INSTRUCTION),
        }
    }

    pub fn config(&self) -> &MiproConfig {
        &self.config
    }

    #[instrument(skip_all, fields(program = student.name(), trials = self.config.num_trials))]
    pub async fn compile<P>(
        &self,
        student: &P,
        trainset: &[Example],
        valset: &[Example],
        metric: &dyn Metric,
        cancel: &CancellationToken,
    ) -> Result<OptimizationOutcome<P>>
    where
        P: Program + Clone,
    {
        ensure_disjoint(trainset, valset)?;
        if self.config.num_candidates == 0 {
            return Err(MlError::optimization("MIPRO needs at least one candidate"));
        }

        let demo_sets = self.demo_candidates(student, trainset, metric, cancel).await;
        let instructions = self.instruction_candidates(student, &demo_sets, cancel).await;
        let names: Vec<String> = student
            .named_predictors()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        info!(
            demo_sets = demo_sets.len(),
            instructions = ?instructions.values().map(Vec::len).collect::<Vec<_>>(),
            "Prepared MIPRO search space"
        );

        let mut sampler = TpeSampler::new(self.config.seed);
        let mut cache: HashMap<TrialChoice, (f64, f64)> = HashMap::new();
        let mut scores = Vec::with_capacity(self.config.num_trials);
        let mut best: Option<(f64, P, String)> = None;

        for trial in 0..self.config.num_trials {
            if cancel.is_cancelled() {
                warn!(trial, "MIPRO cancelled");
                break;
            }

            let choice: TrialChoice = names
                .iter()
                .map(|name| {
                    let n_instr = instructions.get(name).map_or(1, Vec::len);
                    (
                        sampler.suggest(&format!("{name}.instruction"), n_instr),
                        sampler.suggest(&format!("{name}.demos"), demo_sets.len()),
                    )
                })
                .collect();
            let program = assemble(student, &names, &choice, &instructions, &demo_sets);
            let label = describe_choice(trial, &names, &choice);

            let (score, mean_score) = match cache.get(&choice) {
                Some(cached) => {
                    debug!(trial, "Configuration already scored");
                    *cached
                }
                None => {
                    let report = self.evaluator.evaluate(&program, metric, valset).await;
                    let scored = (report.pass_rate, report.mean_score);
                    cache.insert(choice.clone(), scored);
                    scored
                }
            };

            for (name, (instr, demos)) in names.iter().zip(&choice) {
                sampler.observe(&format!("{name}.instruction"), *instr, score);
                sampler.observe(&format!("{name}.demos"), *demos, score);
            }

            let improved = best.as_ref().is_none_or(|(s, _, _)| score > *s);
            info!(trial, score, new_best = improved, "MIPRO trial complete");
            scores.push(CandidateScore {
                index: trial,
                label: label.clone(),
                score,
                mean_score,
            });
            if improved {
                best = Some((score, program, label));
            }
        }

        let (score, program, label) = best.ok_or(MlError::Cancelled)?;
        Ok(OptimizationOutcome {
            program,
            label,
            score,
            candidates: scores,
        })
    }

    /// `num_candidates` demo sets: none, labeled only, then seeded bootstraps.
    async fn demo_candidates<P>(
        &self,
        student: &P,
        trainset: &[Example],
        metric: &dyn Metric,
        cancel: &CancellationToken,
    ) -> Vec<DemoSet>
    where
        P: Program + Clone,
    {
        let cfg = &self.config;
        let mut sets = vec![DemoSet::new()];

        for i in 1..cfg.num_candidates {
            if cancel.is_cancelled() {
                break;
            }
            let set = if i == 1 {
                BootstrapFewShot::new(0, cfg.max_labeled_demos)
                    .bootstrap(student, None, trainset, metric)
                    .await
            } else {
                let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(i as u64));
                let mut shuffled = trainset.to_vec();
                shuffled.shuffle(&mut rng);
                let budget = rng.gen_range(1..=cfg.max_bootstrapped_demos.max(1));
                BootstrapFewShot::new(budget, cfg.max_labeled_demos)
                    .bootstrap(student, None, &shuffled, metric)
                    .await
            };
            sets.push(set);
        }
        sets
    }

    /// Per predictor: the current instruction first, then distinct proposals.
    async fn instruction_candidates<P>(
        &self,
        student: &P,
        demo_sets: &[DemoSet],
        cancel: &CancellationToken,
    ) -> BTreeMap<String, Vec<String>>
    where
        P: Program,
    {
        let mut candidates = BTreeMap::new();
        for predictor in student.named_predictors() {
            let mut list = vec![predictor.instructions().to_string()];
            let demos = demo_sets
                .last()
                .and_then(|set| set.get(predictor.name()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for i in 1..self.config.num_candidates {
                if cancel.is_cancelled() {
                    break;
                }
                let hint = PROPOSAL_HINTS[(i - 1) % PROPOSAL_HINTS.len()];
                match self.propose_instruction(predictor, demos, hint).await {
                    Ok(text) if !text.is_empty() && !list.contains(&text) => list.push(text),
                    Ok(_) => debug!(predictor = predictor.name(), "Dropped empty or duplicate proposal"),
                    Err(e) => warn!(predictor = predictor.name(), error = %e, "Instruction proposal failed"),
                }
            }
            candidates.insert(predictor.name().to_string(), list);
        }
        candidates
    }

    async fn propose_instruction(
        &self,
        predictor: &Predictor,
        demos: &[Example],
        hint: &str,
    ) -> aura_core::Result<String> {
        let inputs = fields([
            ("signature_description", predictor.signature().describe()),
            ("current_instruction", predictor.instructions().to_string()),
            ("demonstrations", render_demos(demos)),
            ("proposal_hint", hint.to_string()),
        ]);
        let mut out = self.proposer.call(&self.propose, &inputs, None).await?;
        Ok(out
            .remove("proposed_instruction")
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

fn assemble<P>(
    student: &P,
    names: &[String],
    choice: &TrialChoice,
    instructions: &BTreeMap<String, Vec<String>>,
    demo_sets: &[DemoSet],
) -> P
where
    P: Program + Clone,
{
    let mut program = student.clone();
    let mut demos = DemoSet::new();
    for (name, (instr, set)) in names.iter().zip(choice) {
        if let Some(set) = demo_sets.get(*set).and_then(|s| s.get(name)) {
            demos.insert(name.clone(), set.clone());
        }
        if let Some(predictor) = program.predictor_mut(name) {
            let text = if *instr == 0 {
                None
            } else {
                instructions.get(name).and_then(|l| l.get(*instr)).cloned()
            };
            predictor.set_instructions(text);
        }
    }
    apply_demos(&mut program, &demos);
    program
}

fn describe_choice(trial: usize, names: &[String], choice: &TrialChoice) -> String {
    let parts: Vec<String> = names
        .iter()
        .zip(choice)
        .map(|(name, (i, d))| format!("{name}=i{i}/d{d}"))
        .collect();
    format!("trial {trial}: {}", parts.join(" "))
}

/// Demonstrations as `field: value` blocks for the proposer prompt.
pub fn render_demos(demos: &[Example]) -> String {
    if demos.is_empty() {
        return "No demonstrations available.".to_string();
    }
    demos
        .iter()
        .take(PROPOSAL_DEMOS)
        .map(|demo| {
            demo.fields()
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
