//! CLI subcommand handlers.

use crate::engine::{self, PipelineMode, ResearchRequest};
use crate::{Commands, ConfigAction, LlmArgs, OptimizeMethod};
use aura_core::config::{AuraConfig, load_config};
use aura_core::{AuraArchitect, create_retriever};
use aura_ml::eval::{Evaluator, ResearchQualityJudge, ResearchQualityMetric, gold_dataset};
use aura_ml::optimize::{BootstrapRandomSearch, Mipro, MiproConfig, OptimizationOutcome};
use aura_ml::{BOOTSTRAP_ARTIFACT, Distiller, ExternalTrainer, FinetuneBackend, MIPRO_ARTIFACT};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            goal,
            mode,
            llm,
            retrieval,
            retriever_url,
            k,
            max_hops,
            candidates,
            compiled,
            json,
        } => {
            let config = load(workspace)?;
            let mut request = ResearchRequest::from_config(&config, goal);
            request.mode = mode;
            if let Some(provider) = llm.provider {
                request.provider = provider;
                request.model = None;
            }
            if llm.model.is_some() {
                request.model = llm.model;
            }
            if llm.api_key.is_some() {
                request.api_key = llm.api_key;
            }
            if let Some(retrieval) = retrieval {
                request.retrieval = retrieval;
            }
            request.retriever_url = retriever_url;
            request.k = k.unwrap_or(request.k);
            request.max_hops = max_hops.unwrap_or(request.max_hops);
            request.candidates = candidates.unwrap_or(request.candidates);

            let compiled = compiled.map(|p| workspace.join(p));
            let prediction = engine::run_request(&request, &config, compiled.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print!("{}", engine::render_text(&prediction));
            }
            Ok(())
        }
        Commands::Optimize { method, llm } => handle_optimize(method, llm, workspace).await,
        Commands::Evaluate {
            mode,
            compiled,
            llm,
            json,
        } => handle_evaluate(mode, compiled, llm, json, workspace).await,
        Commands::Distill {
            teacher,
            trainer,
            trainer_args,
            llm,
        } => handle_distill(teacher, trainer, trainer_args, llm, workspace).await,
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<AuraConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

/// Workspace configuration with the command's provider selection applied.
/// `model_default` applies when neither a model nor a provider is given.
fn llm_config(workspace: &Path, llm: LlmArgs, model_default: Option<&str>) -> anyhow::Result<AuraConfig> {
    let mut config = load(workspace)?;
    let model = match (&llm.model, &llm.provider) {
        (Some(model), _) => Some(model.clone()),
        (None, None) => model_default.map(str::to_string),
        (None, Some(_)) => None,
    };
    let provider = llm.provider.unwrap_or_else(|| config.llm.provider.clone());
    engine::apply_llm(&mut config, &provider, model.as_deref(), llm.api_key.as_deref())?;
    Ok(config)
}

/// Token cancelled on Ctrl-C. Optimizers stop at the next candidate boundary.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing the current candidate");
            child.cancel();
        }
    });
    token
}

fn metric_for(config: &AuraConfig, executor: aura_core::StepExecutor) -> ResearchQualityMetric {
    ResearchQualityMetric::with_threshold(
        ResearchQualityJudge::new(executor),
        config.optimizer.pass_threshold,
    )
}

async fn handle_optimize(method: OptimizeMethod, llm: LlmArgs, workspace: &Path) -> anyhow::Result<()> {
    let base = load(workspace)?;
    let config = llm_config(workspace, llm, Some(&base.optimizer.optimizer_model))?;
    let executor = engine::executor_for(&config)?;
    let retriever = create_retriever(&config.retrieval)?;
    let student = AuraArchitect::new(executor.clone(), retriever, config.pipeline.k);
    let metric = metric_for(&config, executor.clone());
    let evaluator = Evaluator::new(config.optimizer.concurrency);
    let (trainset, devset) = gold_dataset();
    let cancel = cancel_on_ctrl_c();

    info!(method = ?method, model = %config.llm.model, train = trainset.len(), dev = devset.len(), "Starting optimization");
    let (outcome, optimizer, file): (OptimizationOutcome<AuraArchitect>, &str, &str) = match method {
        OptimizeMethod::Bootstrap => {
            let search = BootstrapRandomSearch::new((&config.optimizer).into(), evaluator);
            let outcome = search
                .compile(&student, None, &trainset, &devset, &metric, &cancel)
                .await?;
            (outcome, "bootstrap_random_search", BOOTSTRAP_ARTIFACT)
        }
        OptimizeMethod::Mipro => {
            let mipro = Mipro::new(MiproConfig::from(&config.optimizer), evaluator, executor);
            let outcome = mipro
                .compile(&student, &trainset, &devset, &metric, &cancel)
                .await?;
            (outcome, "mipro", MIPRO_ARTIFACT)
        }
    };

    println!("Candidates:");
    for c in &outcome.candidates {
        println!("  {:>3}  pass {:.2}  mean {:.2}  {}", c.index, c.score, c.mean_score, c.label);
    }
    println!("Best: {} (dev pass rate {:.2})", outcome.label, outcome.score);

    let path = workspace.join(&config.paths.compiled_programs_dir).join(file);
    outcome.to_artifact(optimizer).save(&path)?;
    println!("Saved compiled program to {}", path.display());
    Ok(())
}

async fn handle_evaluate(
    mode: PipelineMode,
    compiled: Option<PathBuf>,
    llm: LlmArgs,
    json: bool,
    workspace: &Path,
) -> anyhow::Result<()> {
    let config = llm_config(workspace, llm, None)?;
    let executor = engine::executor_for(&config)?;
    let retriever = create_retriever(&config.retrieval)?;
    let mut program = engine::build_program(mode, &config, executor.clone(), retriever)?;
    if let Some(path) = compiled {
        aura_ml::load_into(&workspace.join(path), &mut *program)?;
    }

    let metric = metric_for(&config, executor);
    let (_, devset) = gold_dataset();
    let report = Evaluator::new(config.optimizer.concurrency)
        .evaluate(&*program, &metric, &devset)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for r in &report.results {
        let status = if r.passed { "pass" } else { "fail" };
        println!("  {status}  {:.1}  {}", r.score, r.goal);
        if let Some(err) = &r.error {
            println!("        error: {err}");
        }
    }
    println!(
        "{}: {}/{} passed, mean score {:.2}",
        report.program,
        report.passed(),
        report.results.len(),
        report.mean_score
    );
    Ok(())
}

async fn handle_distill(
    teacher: Option<PathBuf>,
    trainer: Option<PathBuf>,
    trainer_args: Vec<String>,
    llm: LlmArgs,
    workspace: &Path,
) -> anyhow::Result<()> {
    let base = load(workspace)?;
    let config = llm_config(workspace, llm, Some(&base.optimizer.teacher_model))?;
    let executor = engine::executor_for(&config)?;
    let retriever = create_retriever(&config.retrieval)?;
    let mut program = AuraArchitect::new(executor.clone(), retriever, config.pipeline.k);

    let teacher_path = teacher.map(|p| workspace.join(p));
    match &teacher_path {
        Some(path) if path.exists() => {
            aura_ml::load_into(path, &mut program)?;
        }
        Some(path) => warn!(path = %path.display(), "Teacher artifact not found; distilling the uncompiled pipeline"),
        None => info!("No teacher artifact given; distilling the uncompiled pipeline"),
    }

    let backend = trainer.map(|t| ExternalTrainer::new(t).with_args(trainer_args));
    let metric = metric_for(&config, executor);
    let (trainset, _) = gold_dataset();
    let output_dir = workspace.join(&config.paths.distilled_models_dir);
    let distiller = Distiller::new(config.optimizer.distill_target.clone(), output_dir);

    let report = distiller
        .run(
            &program,
            &trainset,
            &metric,
            backend.as_ref().map(|b| b as &dyn FinetuneBackend),
            &cancel_on_ctrl_c(),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".aura");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&AuraConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
