//! The program abstraction optimizers work on.
//!
//! A [`Program`] maps a research goal to a [`Prediction`] and exposes its
//! predictors by name so their instructions and demonstrations can be tuned,
//! saved, and restored.

use crate::error::{Result, ValidationError};
use crate::predict::{Predictor, PredictorState};
use crate::prediction::Prediction;
use crate::trace::Trace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A composable, optimizable pipeline.
#[async_trait]
pub trait Program: Send + Sync {
    /// Short identifier, e.g. "aura_architect".
    fn name(&self) -> &str;

    /// Run the pipeline on one goal, optionally recording every step.
    async fn forward(&self, goal: &str, trace: Option<&Trace>) -> Result<Prediction>;

    /// Predictors in a stable order.
    fn named_predictors(&self) -> Vec<&Predictor>;

    fn named_predictors_mut(&mut self) -> Vec<&mut Predictor>;

    fn predictor(&self, name: &str) -> Option<&Predictor> {
        self.named_predictors().into_iter().find(|p| p.name() == name)
    }

    fn predictor_mut(&mut self, name: &str) -> Option<&mut Predictor> {
        self.named_predictors_mut()
            .into_iter()
            .find(|p| p.name() == name)
    }

    /// Snapshot of all learned state.
    fn dump_state(&self) -> ProgramState {
        ProgramState {
            predictors: self
                .named_predictors()
                .into_iter()
                .map(|p| (p.name().to_string(), p.state()))
                .collect(),
        }
    }

    /// Restore learned state. Every saved predictor must exist in this program
    /// with the same signature; nothing is written unless all of them match.
    fn load_state(&mut self, state: &ProgramState) -> Result<()> {
        for (name, saved) in &state.predictors {
            let reason = match self.predictor(name) {
                None => format!("program '{}' has no such predictor", self.name()),
                Some(p) if p.signature().id != saved.signature => format!(
                    "saved state targets {} but predictor uses {}",
                    saved.signature,
                    p.signature().id
                ),
                Some(_) => continue,
            };
            return Err(ValidationError::InvalidValue {
                field: name.clone(),
                reason,
            }
            .into());
        }
        for predictor in self.named_predictors_mut() {
            if let Some(saved) = state.predictors.get(predictor.name()) {
                predictor.load_state(saved.clone())?;
            }
        }
        Ok(())
    }

    /// Remove all instruction overrides and demonstrations.
    fn reset(&mut self) {
        for p in self.named_predictors_mut() {
            p.reset();
        }
    }
}

/// Learned state of a whole program, keyed by predictor name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramState {
    pub predictors: BTreeMap<String, PredictorState>,
}

impl ProgramState {
    pub fn total_demos(&self) -> usize {
        self.predictors.values().map(|p| p.demos.len()).sum()
    }
}
