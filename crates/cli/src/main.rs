//! Evidence CLI
//!
//! Runs one retrieval pipeline invocation against a hosted LLM and prints the
//! result as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evidence_core::config::PipelineConfig;
use evidence_core::generation::LlmGenerator;
use evidence_core::models::{GeneratorConfig, LlmProvider, ModelConfig};
use evidence_core::pipeline::IterationController;
use evidence_core::state::{CheckpointArchive, EvidenceDb};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

#[derive(Parser)]
#[command(author, version, about = "Evidence - quality-gated literature retrieval")]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the pipeline for one case description
    Run {
        /// Case description file, or `-` for stdin
        #[arg(long)]
        case: String,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// LLM provider (anthropic, openai, gemini, openrouter, grok, deepseek)
        #[arg(long)]
        provider: Option<String>,
        /// Model name for every generation task
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Archive checkpoints into this SQLite file
        #[arg(long)]
        checkpoint_db: Option<PathBuf>,
    },
    /// Print the default configuration
    Config,
    /// List archived runs
    Runs {
        #[arg(long)]
        db: PathBuf,
    },
    /// List checkpoints archived for a run
    Checkpoints {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        run_id: String,
    },
}

/// Configuration file: pipeline policy plus model selection
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    #[serde(flatten)]
    pipeline: PipelineConfig,
    generator: GeneratorConfig,
}

/// Install the stderr subscriber. Reads `EVIDENCE_LOG`, e.g.
/// `EVIDENCE_LOG=evidence_core::search=debug,evidence_core=info`.
fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("EVIDENCE_LOG")
            .unwrap_or_else(|_| EnvFilter::new("evidence_core=info,evidence=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .init();
    });
}

fn read_case(source: &str) -> Result<String> {
    let text = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read case from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read case file {}", source))?
    };

    if text.trim().is_empty() {
        anyhow::bail!("Case description is empty");
    }
    Ok(text)
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(FileConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // API keys may live in a local .env
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    match args.command {
        CliCommand::Run {
            case,
            config,
            provider,
            model,
            max_iterations,
            checkpoint_db,
        } => {
            let case_description = read_case(&case)?;
            let mut file_config = load_config(config.as_deref())?;

            if let Some(name) = provider {
                let provider = LlmProvider::from_name(&name)
                    .with_context(|| format!("Unknown provider '{}'", name))?;
                file_config.generator.global = ModelConfig::for_provider(provider);
            }
            if let Some(model) = model {
                file_config.generator.global.model = model;
                file_config.generator.per_task.clear();
            }
            if let Some(max_iterations) = max_iterations {
                file_config.pipeline.max_iterations = max_iterations;
            }
            if checkpoint_db.is_some() {
                file_config.pipeline.checkpoint_db = checkpoint_db;
            }

            tracing::info!(
                provider = ?file_config.generator.global.provider,
                model = %file_config.generator.global.model,
                "Starting pipeline"
            );

            let generator = Arc::new(LlmGenerator::new(file_config.generator));
            let mut controller = IterationController::new(file_config.pipeline, generator);
            let result = controller.run(&case_description).await?;

            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        CliCommand::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
        CliCommand::Runs { db } => {
            let db = EvidenceDb::open_at(&db)?;
            for run in db.list_runs()? {
                let summary: String = run
                    .case_description
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .chars()
                    .take(60)
                    .collect();
                println!("{}\t{}\t{}", run.id, run.started_at.to_rfc3339(), summary);
            }
        }
        CliCommand::Checkpoints { db, run_id } => {
            let db = EvidenceDb::open_at(&db)?;
            let archive = CheckpointArchive::for_run(&db, &run_id);
            for (name, timestamp) in archive.list()? {
                println!("{}\t{}", timestamp.to_rfc3339(), name);
            }
        }
    }

    Ok(())
}
