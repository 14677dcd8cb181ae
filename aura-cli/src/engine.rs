//! Request validation and pipeline assembly shared by the subcommands.

use aura_core::config::{AuraConfig, RetrievalMode};
use aura_core::error::{AuraError, ConfigError, ValidationError};
use aura_core::modules::{AuraMultiHop, AuraReflector};
use aura_core::providers::models::ProviderKind;
use aura_core::{
    AuraArchitect, Brain, Prediction, Program, Retriever, StepExecutor, create_provider,
    create_retriever,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Inclusive bounds on passages per retrieval.
pub const K_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

/// Which pipeline answers the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Query, retrieve, synthesize.
    Standard,
    /// Iterative retrieval over several hops.
    Multihop,
    /// Tool-using reasoning loop.
    Agent,
    /// Standard pipeline with best-of-n synthesis.
    Reflector,
}

/// One caller-facing pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchRequest {
    pub mode: PipelineMode,
    pub provider: String,
    pub model: Option<String>,
    pub retrieval: RetrievalMode,
    pub retriever_url: Option<String>,
    pub k: usize,
    pub max_hops: usize,
    pub candidates: usize,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub goal: String,
}

impl ResearchRequest {
    /// Request with the configured defaults for everything but the goal.
    pub fn from_config(config: &AuraConfig, goal: impl Into<String>) -> Self {
        Self {
            mode: PipelineMode::Standard,
            provider: config.llm.provider.clone(),
            model: Some(config.llm.model.clone()),
            retrieval: config.retrieval.mode,
            retriever_url: None,
            k: config.pipeline.k,
            max_hops: config.pipeline.max_hops,
            candidates: config.pipeline.candidates,
            api_key: config.llm.api_key.clone(),
            goal: goal.into(),
        }
    }

    /// Check the request and fold it into `base`. Makes no network calls.
    pub fn resolve(&self, base: &AuraConfig) -> Result<AuraConfig, AuraError> {
        if self.goal.trim().is_empty() {
            return Err(invalid("goal", "the research goal must not be empty"));
        }
        if !K_RANGE.contains(&self.k) {
            return Err(invalid(
                "k",
                format!("must be between {} and {}", K_RANGE.start(), K_RANGE.end()),
            ));
        }
        let mut config = base.clone();
        apply_llm(
            &mut config,
            &self.provider,
            self.model.as_deref(),
            self.api_key.as_deref(),
        )?;

        config.retrieval.mode = self.retrieval;
        if let Some(url) = &self.retriever_url {
            config.retrieval.url = url.clone();
        }
        config.pipeline.k = self.k;
        config.pipeline.max_hops = self.max_hops;
        config.pipeline.candidates = self.candidates;
        Ok(config)
    }
}

/// Point `config` at `provider`, optionally overriding model and credential.
///
/// Switching provider resets model, endpoint and credential variable to the
/// provider's defaults. Fails when the provider is unknown or needs a
/// credential that cannot be resolved.
pub fn apply_llm(
    config: &mut AuraConfig,
    provider: &str,
    model: Option<&str>,
    api_key: Option<&str>,
) -> Result<(), AuraError> {
    let kind = ProviderKind::parse(provider)?;
    if kind.key() != config.llm.provider {
        config.llm.provider = kind.key().to_string();
        config.llm.api_key_env = kind.api_key_env().to_string();
        config.llm.base_url = None;
        config.llm.model = kind.default_model().to_string();
    }
    if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
        config.llm.model = model.to_string();
    }
    if let Some(key) = api_key {
        config.llm.api_key = Some(key.to_string());
    }
    if kind.requires_api_key() && config.llm.resolve_api_key().is_none() {
        return Err(ConfigError::MissingCredential {
            provider: kind.key().to_string(),
        }
        .into());
    }
    Ok(())
}

fn invalid(field: &str, reason: impl Into<String>) -> AuraError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Build the pipeline for `mode` from explicit dependencies.
pub fn build_program(
    mode: PipelineMode,
    config: &AuraConfig,
    executor: StepExecutor,
    retriever: Arc<dyn Retriever>,
) -> Result<Box<dyn Program>, AuraError> {
    let pipeline = &config.pipeline;
    let program: Box<dyn Program> = match mode {
        PipelineMode::Standard => Box::new(AuraArchitect::new(executor, retriever, pipeline.k)),
        PipelineMode::Reflector => Box::new(AuraArchitect::with_strategy(
            executor,
            retriever,
            pipeline.k,
            Box::new(AuraReflector::new(pipeline.candidates)?),
        )),
        PipelineMode::Multihop => Box::new(AuraMultiHop::new(
            executor,
            retriever,
            pipeline.max_hops,
            pipeline.k,
        )?),
        PipelineMode::Agent => Box::new(aura_tools::build_agent(
            executor,
            retriever,
            pipeline.agent_max_iters,
        )?),
    };
    Ok(program)
}

/// Live executor for the configured provider and model.
pub fn executor_for(config: &AuraConfig) -> Result<StepExecutor, AuraError> {
    let provider = create_provider(&config.llm)?;
    Ok(StepExecutor::from_config(Brain::new(provider), &config.llm))
}

/// Same configuration with a different model on the same provider.
pub fn with_model(config: &AuraConfig, model: &str) -> AuraConfig {
    let mut config = config.clone();
    config.llm.model = model.to_string();
    config
}

/// Validate, assemble and run one request against live services.
pub async fn run_request(
    request: &ResearchRequest,
    base: &AuraConfig,
    compiled: Option<&Path>,
) -> anyhow::Result<Prediction> {
    let config = request.resolve(base)?;
    let executor = executor_for(&config)?;
    let retriever = create_retriever(&config.retrieval)?;
    let mut program = build_program(request.mode, &config, executor, retriever)?;

    if let Some(path) = compiled {
        aura_ml::load_into(path, &mut *program)?;
    }

    info!(
        mode = ?request.mode,
        program = program.name(),
        provider = %config.llm.provider,
        model = %config.llm.model,
        "Running research pipeline"
    );
    Ok(program.forward(&request.goal, None).await?)
}

/// Human-readable rendering of a prediction.
pub fn render_text(prediction: &Prediction) -> String {
    let mut out = String::new();
    match prediction {
        Prediction::Research(p) => {
            out.push_str(&format!("Search query: {}\n\n", p.search_query));
            for (i, passage) in p.context.iter().enumerate() {
                out.push_str(&format!("[{}] {}\n", i + 1, passage));
            }
            out.push_str(&format!("\n{}\n", p.structured_insight));
        }
        Prediction::MultiHop(p) => {
            for (i, query) in p.hop_queries.iter().enumerate() {
                out.push_str(&format!("Hop {}: {}\n", i + 1, query));
            }
            out.push_str(&format!("\n{} passages gathered\n\n{}\n", p.context.len(), p.answer));
        }
        Prediction::Agent(p) => {
            for (i, step) in p.trajectory.iter().enumerate() {
                out.push_str(&format!(
                    "{}. {}({}) -> {}\n",
                    i + 1,
                    step.tool,
                    step.args,
                    step.observation
                ));
            }
            out.push_str(&format!("\n{}\n", p.answer));
        }
        other => out.push_str(&format!("{}\n", other.insight_text())),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::adapter::{format_reply, signature_of};
    use aura_core::error::ErrorKind;
    use aura_core::{LocalKnowledgeBase, MockLlmProvider, SignatureId};

    fn request(goal: &str) -> ResearchRequest {
        ResearchRequest {
            mode: PipelineMode::Standard,
            provider: "ollama".into(),
            model: None,
            retrieval: RetrievalMode::Local,
            retriever_url: None,
            k: 3,
            max_hops: 2,
            candidates: 3,
            api_key: None,
            goal: goal.into(),
        }
    }

    #[test]
    fn test_empty_goal_rejected() {
        let err = request("   ").resolve(&AuraConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_k_bounds() {
        for k in [0, 11] {
            let mut r = request("goal");
            r.k = k;
            assert_eq!(r.resolve(&AuraConfig::default()).unwrap_err().kind(), ErrorKind::Validation);
        }
        let mut r = request("goal");
        r.k = 10;
        assert_eq!(r.resolve(&AuraConfig::default()).unwrap().pipeline.k, 10);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut r = request("goal");
        r.provider = "anthropic-local".into();
        let err = r.resolve(&AuraConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_credential_required_for_cloud_provider() {
        let mut base = AuraConfig::default();
        base.llm.api_key_env = "AURA_TEST_UNSET_KEY_VARIABLE".into();
        let mut r = request("goal");
        r.provider = "openai".into();
        let err = r.resolve(&base).unwrap_err();
        assert!(err.to_string().contains("requires an API key"));

        r.api_key = Some("sk-test".into());
        let config = r.resolve(&base).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_switching_provider_picks_its_defaults() {
        let config = request("goal").resolve(&AuraConfig::default()).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.api_key_env, "OLLAMA_API_KEY");
    }

    fn mock_executor() -> StepExecutor {
        let provider = MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::GenerateSearchQuery) => {
                    format_reply(&[("reasoning", "r"), ("search_query", "distillation")])
                }
                Some(SignatureId::ResearchSynthesizer) => {
                    format_reply(&[("reasoning", "r"), ("structured_insight", "insight")])
                }
                _ => String::new(),
            })
        });
        StepExecutor::new(Brain::new(Arc::new(provider)))
    }

    #[test]
    fn test_build_program_names() {
        let config = AuraConfig::default();
        let cases = [
            (PipelineMode::Standard, "aura_architect", 2),
            (PipelineMode::Reflector, "aura_architect", 3),
            (PipelineMode::Multihop, "aura_multihop", 2),
            (PipelineMode::Agent, "aura_agent", 2),
        ];
        for (mode, name, predictors) in cases {
            let program =
                build_program(mode, &config, mock_executor(), Arc::new(LocalKnowledgeBase::new()))
                    .unwrap();
            assert_eq!(program.name(), name);
            assert_eq!(program.named_predictors().len(), predictors, "{mode:?}");
        }
    }

    #[tokio::test]
    async fn test_standard_program_runs_and_renders() {
        let program = build_program(
            PipelineMode::Standard,
            &AuraConfig::default(),
            mock_executor(),
            Arc::new(LocalKnowledgeBase::new()),
        )
        .unwrap();
        let prediction = program.forward("Explain knowledge distillation.", None).await.unwrap();
        let text = render_text(&prediction);
        assert!(text.starts_with("Search query: distillation"));
        assert!(text.contains("[3] "));
        assert!(text.trim_end().ends_with("insight"));
    }
}
