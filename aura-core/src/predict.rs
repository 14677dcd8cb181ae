//! Predictors and the reasoning step executor.
//!
//! A [`Predictor`] is the learnable unit of a program: a signature plus an
//! optional instruction override and an ordered list of demonstrations. The
//! [`StepExecutor`] turns a predictor and its inputs into one or more output
//! records by way of the chat adapter and the shared [`Brain`].

use crate::adapter;
use crate::brain::Brain;
use crate::config::LlmConfig;
use crate::error::{AuraError, Result, ValidationError};
use crate::example::{Example, FieldMap};
use crate::signature::{Field, Signature, SignatureId};
use crate::trace::Trace;
use crate::types::CompletionRequest;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A signature bound to learnable prompt state.
#[derive(Debug, Clone)]
pub struct Predictor {
    name: String,
    signature: &'static Signature,
    chain_of_thought: bool,
    instructions: Option<String>,
    demos: Vec<Example>,
}

impl Predictor {
    /// Plain predictor: outputs only the signature's fields.
    pub fn new(name: impl Into<String>, signature: &'static Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            chain_of_thought: false,
            instructions: None,
            demos: Vec::new(),
        }
    }

    /// Chain-of-thought predictor: also requests a `reasoning` rationale.
    pub fn chain_of_thought(name: impl Into<String>, signature: &'static Signature) -> Self {
        Self {
            chain_of_thought: true,
            ..Self::new(name, signature)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &'static Signature {
        self.signature
    }

    pub fn is_chain_of_thought(&self) -> bool {
        self.chain_of_thought
    }

    /// Effective instructions: the override if set, else the signature's.
    pub fn instructions(&self) -> &str {
        self.instructions
            .as_deref()
            .unwrap_or(self.signature.instructions)
    }

    pub fn set_instructions(&mut self, instructions: Option<String>) {
        self.instructions = instructions;
    }

    pub fn demos(&self) -> &[Example] {
        &self.demos
    }

    pub fn set_demos(&mut self, demos: Vec<Example>) {
        self.demos = demos;
    }

    /// Drop learned state.
    pub fn reset(&mut self) {
        self.instructions = None;
        self.demos.clear();
    }

    pub fn output_fields(&self) -> Vec<Field> {
        adapter::output_fields(self.signature, self.chain_of_thought)
    }

    pub fn state(&self) -> PredictorState {
        PredictorState {
            signature: self.signature.id,
            instructions: self.instructions.clone(),
            demos: self.demos.clone(),
        }
    }

    /// Restore learned state. The state must target the same signature.
    pub fn load_state(&mut self, state: PredictorState) -> Result<()> {
        if state.signature != self.signature.id {
            return Err(ValidationError::InvalidValue {
                field: self.name.clone(),
                reason: format!(
                    "saved state targets {} but predictor uses {}",
                    state.signature, self.signature.id
                ),
            }
            .into());
        }
        self.instructions = state.instructions;
        self.demos = state.demos;
        Ok(())
    }

    fn validate_inputs(&self, inputs: &FieldMap) -> Result<()> {
        for field in self.signature.inputs {
            if !inputs.contains_key(field.name) {
                return Err(ValidationError::MissingInput {
                    signature: self.signature.name().to_string(),
                    field: field.name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Serializable learned state of one predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorState {
    pub signature: SignatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub demos: Vec<Example>,
}

/// Executes predictors against the language model.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    brain: Brain,
    temperature: f32,
    sampling_temperature: f32,
    max_tokens: Option<usize>,
    model: Option<String>,
}

impl StepExecutor {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            temperature: 0.0,
            sampling_temperature: 0.7,
            max_tokens: None,
            model: None,
        }
    }

    pub fn from_config(brain: Brain, config: &LlmConfig) -> Self {
        Self {
            brain,
            temperature: config.temperature,
            sampling_temperature: config.sampling_temperature,
            max_tokens: Some(config.max_tokens),
            model: None,
        }
    }

    /// Same executor with a different temperature for single calls.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Same executor with a different sampling temperature for multi-candidate calls.
    pub fn with_sampling_temperature(mut self, temperature: f32) -> Self {
        self.sampling_temperature = temperature;
        self
    }

    /// Same executor with a per-request model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Run one predictor call and return its output record.
    pub async fn call(
        &self,
        predictor: &Predictor,
        inputs: &FieldMap,
        trace: Option<&Trace>,
    ) -> Result<FieldMap> {
        let mut records = self.execute(predictor, inputs, 1, trace).await?;
        Ok(records.remove(0))
    }

    /// Run a predictor producing `num_candidates` output records (at least one).
    ///
    /// Multiple candidates are requested concurrently with the sampling
    /// temperature; records come back in request order. The first record is
    /// written to `trace` when given.
    pub async fn execute(
        &self,
        predictor: &Predictor,
        inputs: &FieldMap,
        num_candidates: usize,
        trace: Option<&Trace>,
    ) -> Result<Vec<FieldMap>> {
        predictor.validate_inputs(inputs)?;

        let n = num_candidates.max(1);
        let signature = predictor.signature();
        let outputs = predictor.output_fields();
        let messages = adapter::format_messages(
            signature,
            predictor.instructions(),
            &outputs,
            predictor.demos(),
            inputs,
        );
        let temperature = if n > 1 {
            self.sampling_temperature
        } else {
            self.temperature
        };

        debug!(
            predictor = predictor.name(),
            signature = signature.name(),
            demos = predictor.demos().len(),
            candidates = n,
            "Executing reasoning step"
        );

        let calls = (0..n).map(|_| {
            let request = CompletionRequest {
                messages: messages.clone(),
                temperature,
                max_tokens: self.max_tokens,
                model: self.model.clone(),
                ..Default::default()
            };
            self.brain.complete(request)
        });
        let responses = join_all(calls).await;

        let mut records = Vec::with_capacity(n);
        for response in responses {
            let response = response.map_err(AuraError::from)?;
            let record = adapter::parse_reply(signature, &outputs, &response.text)?;
            debug!(predictor = predictor.name(), fields = ?record.keys().collect::<Vec<_>>(), "Parsed step output");
            records.push(record);
        }

        if let (Some(trace), Some(first)) = (trace, records.first()) {
            trace.record(predictor.name(), inputs.clone(), first.clone());
        }
        Ok(records)
    }
}

/// Build a [`FieldMap`] from string pairs.
pub fn fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> FieldMap
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
