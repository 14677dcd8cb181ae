//! Distillation of an optimized program into a smaller model.
//!
//! The teacher program runs over the training split; every run the metric
//! accepts contributes one chat-format record per reasoning step to a JSONL
//! fine-tuning set. Training itself is delegated to a [`FinetuneBackend`] and
//! is skipped, with a report, when the machine cannot train.

use crate::error::{MlError, Result};
use crate::eval::{GOAL_FIELD, Metric};
use async_trait::async_trait;
use aura_core::adapter::format_exchange;
use aura_core::example::Example;
use aura_core::program::Program;
use aura_core::trace::Trace;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const DATASET_FILE: &str = "distillation_train.jsonl";

/// What a backend needs to fine-tune.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetuneJob {
    pub dataset: PathBuf,
    pub target_model: String,
    pub output_dir: PathBuf,
    pub records: usize,
}

/// Something that can fine-tune a model on a JSONL chat dataset.
#[async_trait]
pub trait FinetuneBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Why training cannot run on this machine, or `None` when it can.
    async fn unavailable_reason(&self) -> Option<String>;

    /// Train and return the directory holding the trained model.
    async fn finetune(&self, job: &FinetuneJob) -> Result<PathBuf>;
}

/// Name of the first GPU reported by `nvidia-smi -L`, if any.
pub async fn detect_accelerator() -> Option<String> {
    let output = Command::new("nvidia-smi")
        .arg("-L")
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Runs an external training command:
/// `<program> <args..> --data <jsonl> --model <target> --output <dir>`.
#[derive(Debug, Clone)]
pub struct ExternalTrainer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalTrainer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(6 * 60 * 60),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FinetuneBackend for ExternalTrainer {
    fn name(&self) -> &str {
        "external"
    }

    async fn unavailable_reason(&self) -> Option<String> {
        match detect_accelerator().await {
            Some(gpu) => {
                debug!(gpu = %gpu, "Detected accelerator");
                None
            }
            None => Some("no GPU detected".to_string()),
        }
    }

    async fn finetune(&self, job: &FinetuneJob) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&job.output_dir).await?;
        info!(program = %self.program.display(), records = job.records, "Starting fine-tuning");

        let result = tokio::time::timeout(self.timeout, async {
            Command::new(&self.program)
                .args(&self.args)
                .arg("--data")
                .arg(&job.dataset)
                .arg("--model")
                .arg(&job.target_model)
                .arg("--output")
                .arg(&job.output_dir)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| MlError::distillation(format!("failed to start trainer: {e}")))
        })
        .await;

        let output = match result {
            Ok(output) => output?,
            Err(_) => {
                return Err(MlError::distillation(format!(
                    "trainer timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MlError::distillation(format!(
                "trainer failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(job.output_dir.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DistillationOutcome {
    Trained { model_dir: PathBuf },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistillationReport {
    pub target_model: String,
    pub teacher_runs: usize,
    pub accepted_runs: usize,
    pub records: usize,
    pub dataset: PathBuf,
    pub outcome: DistillationOutcome,
}

impl DistillationReport {
    pub fn trained(&self) -> bool {
        matches!(self.outcome, DistillationOutcome::Trained { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Distiller {
    target_model: String,
    output_dir: PathBuf,
}

impl Distiller {
    pub fn new(target_model: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_model: target_model.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Directory the trained student is written to, e.g.
    /// `google/flan-t5-large` becomes `<output_dir>/flan-t5-large-aura`.
    pub fn model_dir(&self) -> PathBuf {
        let short = self
            .target_model
            .rsplit('/')
            .next()
            .unwrap_or(&self.target_model);
        self.output_dir.join(format!("{short}-aura"))
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join(DATASET_FILE)
    }

    /// Build the fine-tuning set from `teacher` and train when possible.
    #[instrument(skip_all, fields(teacher = teacher.name(), target = %self.target_model))]
    pub async fn run<P>(
        &self,
        teacher: &P,
        trainset: &[Example],
        metric: &dyn Metric,
        backend: Option<&dyn FinetuneBackend>,
        cancel: &CancellationToken,
    ) -> Result<DistillationReport>
    where
        P: Program + ?Sized,
    {
        let mut lines = Vec::new();
        let mut teacher_runs = 0;
        let mut accepted_runs = 0;

        for example in trainset {
            if cancel.is_cancelled() {
                warn!(teacher_runs, "Distillation cancelled; using traces collected so far");
                break;
            }
            let Some(goal) = example.get(GOAL_FIELD) else {
                continue;
            };
            teacher_runs += 1;

            let trace = Trace::new();
            let prediction = match teacher.forward(goal, Some(&trace)).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Teacher run failed");
                    continue;
                }
            };
            if !metric.validate(example, &prediction).await {
                continue;
            }
            accepted_runs += 1;
            lines.extend(trace_records(teacher, &trace)?);
        }

        let dataset = self.dataset_path();
        write_jsonl(&dataset, &lines).await?;
        info!(
            teacher_runs,
            accepted_runs,
            records = lines.len(),
            dataset = %dataset.display(),
            "Wrote distillation dataset"
        );

        let mut report = DistillationReport {
            target_model: self.target_model.clone(),
            teacher_runs,
            accepted_runs,
            records: lines.len(),
            dataset: dataset.clone(),
            outcome: DistillationOutcome::Skipped {
                reason: String::new(),
            },
        };

        let skip_reason = if lines.is_empty() {
            Some("no teacher run passed the metric".to_string())
        } else if let Some(backend) = backend {
            backend.unavailable_reason().await
        } else {
            Some("no trainer configured".to_string())
        };
        if let Some(reason) = skip_reason {
            warn!(reason = %reason, "Skipping fine-tuning");
            report.outcome = DistillationOutcome::Skipped { reason };
            return Ok(report);
        }

        let Some(backend) = backend else {
            return Ok(report);
        };
        let job = FinetuneJob {
            dataset,
            target_model: self.target_model.clone(),
            output_dir: self.model_dir(),
            records: lines.len(),
        };
        report.outcome = match backend.finetune(&job).await {
            Ok(model_dir) => {
                info!(backend = backend.name(), model_dir = %model_dir.display(), "Fine-tuning complete");
                DistillationOutcome::Trained { model_dir }
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Fine-tuning failed");
                DistillationOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };
        Ok(report)
    }
}

/// One `{"messages": [...]}` JSON line per traced step.
fn trace_records<P>(program: &P, trace: &Trace) -> Result<Vec<String>>
where
    P: Program + ?Sized,
{
    let mut lines = Vec::new();
    for entry in trace.entries() {
        let Some(predictor) = program.predictor(&entry.predictor) else {
            debug!(predictor = %entry.predictor, "Trace entry has no matching predictor");
            continue;
        };
        let messages = format_exchange(
            predictor.signature(),
            predictor.instructions(),
            &predictor.output_fields(),
            &entry.inputs,
            &entry.outputs,
        );
        lines.push(serde_json::to_string(&serde_json::json!({ "messages": messages }))?);
    }
    Ok(lines)
}

async fn write_jsonl(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}
