//! Execution traces.
//!
//! A [`Trace`] collects `(predictor, inputs, outputs)` for every step executed
//! during one program run. Optimizers turn successful traces into few-shot
//! demonstrations and distillation data.

use crate::example::{Example, FieldMap};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub predictor: String,
    pub inputs: FieldMap,
    pub outputs: FieldMap,
}

impl TraceEntry {
    /// Merge inputs and outputs into a demonstration for the same predictor.
    pub fn to_demo(&self) -> Example {
        let inputs: Vec<&str> = self.inputs.keys().map(|k| k.as_str()).collect();
        let mut fields = self.inputs.clone();
        fields.extend(self.outputs.clone());
        Example::from_fields(fields, &inputs)
    }
}

/// Append-only step log shared by the steps of one run.
#[derive(Debug, Default)]
pub struct Trace {
    entries: Mutex<Vec<TraceEntry>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, predictor: &str, inputs: FieldMap, outputs: FieldMap) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.push(TraceEntry {
            predictor: predictor.to_string(),
            inputs,
            outputs,
        });
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Entries recorded for one predictor, in order.
    pub fn for_predictor(&self, predictor: &str) -> Vec<TraceEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.predictor == predictor)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
