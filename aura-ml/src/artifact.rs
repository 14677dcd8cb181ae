//! Compiled program artifacts.
//!
//! An artifact is a JSON snapshot of a program's learned state (per-predictor
//! instructions and demonstrations, in order) plus metadata about how it was
//! produced. Loading one into a freshly built program of the same kind
//! restores the optimized behaviour without re-running the optimizer.

use crate::error::{MlError, Result};
use aura_core::program::{Program, ProgramState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const BOOTSTRAP_ARTIFACT: &str = "aura_v1_bootstrap.json";
pub const MIPRO_ARTIFACT: &str = "aura_v2_mipro.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// `Program::name` of the program the state belongs to.
    pub program: String,
    pub optimizer: String,
    /// Validation pass rate of the compiled program, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub aura_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub metadata: ArtifactMetadata,
    #[serde(flatten)]
    pub state: ProgramState,
}

impl CompiledProgram {
    pub fn capture<P: Program + ?Sized>(program: &P, optimizer: &str, score: Option<f64>) -> Self {
        Self {
            metadata: ArtifactMetadata {
                program: program.name().to_string(),
                optimizer: optimizer.to_string(),
                score,
                created_at: Utc::now(),
                aura_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            state: program.dump_state(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(
            path = %path.display(),
            program = %self.metadata.program,
            demos = self.state.total_demos(),
            "Saved compiled program"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MlError::artifact(path, "file not found"));
        }
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| MlError::artifact(path, format!("invalid artifact: {e}")))
    }

    /// Load this state into `program`, which must be the same kind of program.
    pub fn apply_to<P: Program + ?Sized>(&self, program: &mut P) -> Result<()> {
        if program.name() != self.metadata.program {
            return Err(MlError::optimization(format!(
                "artifact was compiled for '{}' but the program is '{}'",
                self.metadata.program,
                program.name()
            )));
        }
        program.load_state(&self.state)?;
        Ok(())
    }
}

/// Read an artifact and apply it to `program` in one step.
pub fn load_into<P: Program + ?Sized>(path: &Path, program: &mut P) -> Result<CompiledProgram> {
    let artifact = CompiledProgram::load(path)?;
    artifact.apply_to(program)?;
    info!(
        path = %path.display(),
        optimizer = %artifact.metadata.optimizer,
        "Loaded compiled program"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::testing::{architect, echo_provider};
    use aura_core::example::Example;
    use aura_core::modules::AuraMultiHop;
    use aura_core::predict::StepExecutor;
    use aura_core::retrieval::LocalKnowledgeBase;
    use aura_core::{Brain, MockLlmProvider};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn tuned() -> aura_core::AuraArchitect {
        let mut program = architect(echo_provider());
        let query = program.predictor_mut("generate_query").unwrap();
        query.set_instructions(Some("Write one precise query.".into()));
        query.set_demos(vec![
            Example::new().with("research_goal", "first").with("search_query", "q1"),
            Example::new().with("research_goal", "second").with("search_query", "q2"),
        ]);
        program
    }

    #[test]
    fn test_save_load_apply_preserves_demo_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(BOOTSTRAP_ARTIFACT);
        let artifact = CompiledProgram::capture(&tuned(), "bootstrap_random_search", Some(0.75));
        artifact.save(&path).unwrap();

        let loaded = CompiledProgram::load(&path).unwrap();
        assert_eq!(loaded, artifact);

        let mut fresh = architect(echo_provider());
        loaded.apply_to(&mut fresh).unwrap();
        let query = fresh.predictor("generate_query").unwrap();
        assert_eq!(query.instructions(), "Write one precise query.");
        let goals: Vec<&str> = query.demos().iter().filter_map(|d| d.get("research_goal")).collect();
        assert_eq!(goals, vec!["first", "second"]);
    }

    #[test]
    fn test_json_layout() {
        let artifact = CompiledProgram::capture(&tuned(), "mipro", None);
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["metadata"]["program"], "aura_architect");
        assert!(value["metadata"].get("score").is_none());
        assert!(value["predictors"]["generate_query"]["demos"].is_array());
    }

    #[test]
    fn test_missing_file() {
        let err = CompiledProgram::load(Path::new("/nonexistent/aura.json")).unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_wrong_program_rejected() {
        let artifact = CompiledProgram::capture(&tuned(), "bootstrap", None);
        let exec = StepExecutor::new(Brain::new(Arc::new(MockLlmProvider::new())));
        let mut multihop = AuraMultiHop::new(exec, Arc::new(LocalKnowledgeBase::new()), 2, 3).unwrap();
        assert!(artifact.apply_to(&mut multihop).is_err());
    }
}
