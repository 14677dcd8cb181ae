//! AURA CLI: run research pipelines, compile them against the gold set,
//! evaluate and distill them.

mod commands;
mod engine;

use aura_core::config::RetrievalMode;
use clap::Parser;
use engine::PipelineMode;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// AURA: self-optimizing research synthesis
#[derive(Parser, Debug)]
#[command(name = "aura", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.aura/config.toml` and artifacts)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Provider selection shared by every command that calls a model.
#[derive(clap::Args, Debug, Clone, Default)]
struct LlmArgs {
    /// Provider key: ollama, deepseek or openai
    #[arg(long)]
    provider: Option<String>,

    /// Model name (defaults to the provider's first model)
    #[arg(short, long)]
    model: Option<String>,

    /// API key for credentialed providers
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Answer a research goal
    Run {
        /// The research goal or question
        goal: String,

        /// Pipeline to use
        #[arg(long, value_enum, default_value = "standard")]
        mode: PipelineMode,

        #[command(flatten)]
        llm: LlmArgs,

        /// Retrieval backend: local or colbert
        #[arg(long)]
        retrieval: Option<RetrievalMode>,

        /// Endpoint of the remote retrieval index
        #[arg(long)]
        retriever_url: Option<String>,

        /// Passages per retrieval (1-10)
        #[arg(short, long)]
        k: Option<usize>,

        /// Retrieval hops for multihop mode
        #[arg(long)]
        max_hops: Option<usize>,

        /// Candidate syntheses for reflector mode
        #[arg(long)]
        candidates: Option<usize>,

        /// Compiled program to load before running
        #[arg(long)]
        compiled: Option<PathBuf>,

        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compile the standard pipeline against the gold training split
    Optimize {
        /// Search strategy
        #[arg(long, value_enum)]
        method: OptimizeMethod,

        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Score a pipeline on the gold dev split
    Evaluate {
        /// Pipeline to evaluate
        #[arg(long, value_enum, default_value = "standard")]
        mode: PipelineMode,

        /// Compiled program to load first
        #[arg(long)]
        compiled: Option<PathBuf>,

        #[command(flatten)]
        llm: LlmArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Distill a (compiled) pipeline into a smaller model
    Distill {
        /// Compiled teacher program
        #[arg(long)]
        teacher: Option<PathBuf>,

        /// Training command invoked with --data, --model and --output
        #[arg(long)]
        trainer: Option<PathBuf>,

        /// Extra arguments passed to the training command
        #[arg(long = "trainer-arg")]
        trainer_args: Vec<String>,

        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OptimizeMethod {
    /// Bootstrap few-shot with random search
    Bootstrap,
    /// Joint instruction and demonstration search
    Mipro,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the merged configuration
    Show,
    /// Write a default `.aura/config.toml`
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = aura_core::config::log_dir().unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "aura.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "aura", "run", "Explain knowledge distillation.", "--mode", "reflector", "--provider",
            "ollama", "-k", "5", "--retrieval", "colbert",
        ]);
        match cli.command {
            Commands::Run {
                goal,
                mode,
                llm,
                retrieval,
                k,
                ..
            } => {
                assert_eq!(goal, "Explain knowledge distillation.");
                assert_eq!(mode, PipelineMode::Reflector);
                assert_eq!(llm.provider.as_deref(), Some("ollama"));
                assert_eq!(retrieval, Some(RetrievalMode::Colbert));
                assert_eq!(k, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_optimize_method() {
        let cli = Cli::parse_from(["aura", "optimize", "--method", "mipro", "--api-key", "sk"]);
        assert!(matches!(
            cli.command,
            Commands::Optimize {
                method: OptimizeMethod::Mipro,
                ..
            }
        ));
    }
}
