//! # AURA ML
//!
//! Evaluation and compile-time optimization for AURA programs: the gold
//! dataset, the LLM-as-judge research quality metric, batch evaluation,
//! bootstrap random search, MIPRO-style joint search, distillation into a
//! smaller model, and compiled program artifacts.

pub mod artifact;
pub mod distill;
pub mod error;
pub mod eval;
pub mod optimize;

pub use artifact::{BOOTSTRAP_ARTIFACT, CompiledProgram, MIPRO_ARTIFACT, load_into};
pub use distill::{
    DistillationOutcome, DistillationReport, Distiller, ExternalTrainer, FinetuneBackend,
    detect_accelerator,
};
pub use error::{MlError, Result};
pub use eval::{
    EvaluationReport, Evaluator, Metric, ResearchQualityJudge, ResearchQualityMetric,
    gold_dataset,
};
pub use optimize::{
    BootstrapFewShot, BootstrapRandomSearch, Mipro, MiproConfig, OptimizationOutcome,
    RandomSearchConfig, ensure_disjoint,
};
