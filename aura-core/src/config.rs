//! Configuration system for AURA.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/aura/config.toml` and/or `.aura/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for AURA pipelines and optimizers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuraConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub optimizer: OptimizerConfig,
    pub paths: PathsConfig,
}

/// Language model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider key: "ollama", "deepseek", or "openai".
    pub provider: String,
    /// Model identifier (e.g., "gpt-3.5-turbo", "llama3").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key. Takes precedence over `api_key_env`; never written back to disk.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sampling temperature for single-candidate calls.
    pub temperature: f32,
    /// Sampling temperature used when several candidates are requested at once.
    pub sampling_temperature: f32,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Transient-error retry policy. Zero retries by default.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.0,
            sampling_temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Resolve the credential: explicit key first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Exponential backoff policy for transient provider errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 1000,
            max_backoff_ms: 32_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Which retrieval backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Built-in five-passage knowledge base.
    Local,
    /// Remote ColBERTv2-compatible HTTP index.
    Colbert,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalMode::Local => write!(f, "local"),
            RetrievalMode::Colbert => write!(f, "colbert"),
        }
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "mock" => Ok(RetrievalMode::Local),
            "colbert" | "colbertv2" => Ok(RetrievalMode::Colbert),
            other => Err(format!(
                "unknown retrieval mode '{other}' (expected local or colbert)"
            )),
        }
    }
}

/// Retrieval backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    /// Endpoint of the remote semantic index.
    pub url: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

pub const DEFAULT_COLBERT_URL: &str = "http://20.102.90.50:2017/wiki17_abstracts";

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Local,
            url: DEFAULT_COLBERT_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Pipeline module parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Passages retrieved per call.
    pub k: usize,
    /// Retrieval hops for the multi-hop module.
    pub max_hops: usize,
    /// Candidate syntheses generated by the reflector.
    pub candidates: usize,
    /// Iteration cap for the agent loop.
    pub agent_max_iters: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_hops: 2,
            candidates: 3,
            agent_max_iters: 5,
        }
    }
}

/// Compile-time optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub max_bootstrapped_demos: usize,
    pub max_labeled_demos: usize,
    /// Random-search candidate programs beyond the three fixed baselines.
    pub num_candidate_programs: usize,
    /// Instruction and demo-set candidates per predictor for MIPRO.
    pub mipro_num_candidates: usize,
    pub mipro_num_trials: usize,
    pub mipro_max_bootstrapped_demos: usize,
    pub mipro_max_labeled_demos: usize,
    /// Temperature for the instruction proposer.
    pub mipro_init_temperature: f32,
    /// Minimum judge score for an output to count as passing.
    pub pass_threshold: f64,
    pub seed: u64,
    /// Candidate programs evaluated concurrently.
    pub concurrency: usize,
    /// Model used for the judge and instruction proposals.
    pub optimizer_model: String,
    /// Model that produces traces during distillation.
    pub teacher_model: String,
    /// Fine-tuning target for distillation.
    pub distill_target: String,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_bootstrapped_demos: 4,
            max_labeled_demos: 4,
            num_candidate_programs: 5,
            mipro_num_candidates: 7,
            mipro_num_trials: 10,
            mipro_max_bootstrapped_demos: 3,
            mipro_max_labeled_demos: 3,
            mipro_init_temperature: 1.0,
            pass_threshold: 4.0,
            seed: 0,
            concurrency: 4,
            optimizer_model: "gpt-4o-mini".to_string(),
            teacher_model: "gpt-3.5-turbo".to_string(),
            distill_target: "google/flan-t5-large".to_string(),
        }
    }
}

/// Output locations for artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub compiled_programs_dir: PathBuf,
    pub distilled_models_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            compiled_programs_dir: PathBuf::from("artifacts/compiled_programs"),
            distilled_models_dir: PathBuf::from("artifacts/distilled_models"),
        }
    }
}

/// Load configuration with layered merging.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (CLI arguments)
/// 2. Environment variables (`AURA_` prefix, `__` for nesting)
/// 3. Workspace-local config (`.aura/config.toml`)
/// 4. User config (`~/.config/aura/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AuraConfig>,
) -> Result<AuraConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AuraConfig::default()));

    if let Some(path) = user_config_path() {
        if path.exists() {
            figment = figment.merge(Toml::file(&path));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".aura").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // AURA_LLM__MODEL, AURA_PIPELINE__K, ...
    figment = figment.merge(Env::prefixed("AURA_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "aura", "aura")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Directory for rolling log files.
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "aura", "aura").map(|dirs| dirs.data_dir().join("logs"))
}
