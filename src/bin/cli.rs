//! ImpulseGuard operator CLI: run a single purchase analysis, or drive the
//! sync/reset/consolidate/health operations without starting the HTTP
//! server.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use impulseguard::config::Config;
use impulseguard::error::Result;
use impulseguard::memory::templates;
use impulseguard::mutator::MemoryMutator;
use impulseguard::orchestrator::Orchestrator;
use impulseguard::server::AppState;
use impulseguard::telemetry::TelemetrySample;

#[derive(Parser)]
#[command(name = "impulseguard", about = "ImpulseGuard operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Commands {
    /// Run one purchase analysis from a telemetry JSON file (stdin if omitted).
    Analyze {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Trigger a full vector index re-index.
    Sync,
    /// Overwrite all four memory files with their templates and re-index.
    Reset,
    /// Run the memory consolidation sweep.
    Consolidate,
    /// Report service health.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,impulseguard=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let state = Arc::new(AppState::build(config).await?);

    match cli.command {
        Commands::Analyze { file } => analyze(&state, file).await?,
        Commands::Sync => sync(&state).await?,
        Commands::Reset => reset(&state).await?,
        Commands::Consolidate => consolidate(&state).await,
        Commands::Health => health(&state),
    }

    Ok(())
}

async fn analyze(state: &AppState, file: Option<PathBuf>) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let sample: TelemetrySample = serde_json::from_str(&input)?;

    if let Err(reason) = sample.validate() {
        eprintln!("validation error: {reason}");
        std::process::exit(1);
    }

    let orchestrator = Orchestrator::new(
        &state.config,
        state.baselines.clone(),
        &state.memory,
        state.index.as_ref(),
        &state.gateway,
    )
    .with_cost_tracker(&state.cost_tracker);
    let analysis = orchestrator.analyze_with_fallback(&sample).await;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

async fn sync(state: &AppState) -> Result<()> {
    let files = state.memory.read_all()?;
    let count = files.len();
    state.index.reindex(&files).await?;
    println!("indexed {count} files");
    Ok(())
}

async fn reset(state: &AppState) -> Result<()> {
    let memory_dir = &state.config.memory_dir;
    let vector_index_dir = &state.config.vector_index_dir;

    if let Ok(entries) = std::fs::read_dir(memory_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let is_canonical = templates::MEMORY_FILES
                .iter()
                .any(|f| name.to_str() == Some(f));
            if is_canonical || &path == vector_index_dir {
                continue;
            }
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    let _ = std::fs::remove_dir_all(vector_index_dir);
    std::fs::create_dir_all(vector_index_dir)?;

    for file_name in templates::MEMORY_FILES {
        let content = templates::default_content(file_name).unwrap_or_default();
        state.memory.write_file(file_name, content)?;
    }

    let files = state.memory.read_all()?;
    state.index.reindex(&files).await?;
    println!("files_reset: {}", templates::MEMORY_FILES.len());
    Ok(())
}

async fn consolidate(state: &AppState) {
    let mutator = MemoryMutator::new(
        &state.memory,
        state.index.as_ref(),
        &state.gateway,
        state.config.refinement_threshold,
    );
    let results = mutator
        .consolidate(
            state.config.consolidation_size_threshold,
            state.config.consolidation_observation_threshold,
        )
        .await;
    for result in results {
        println!("{:?}: {:?}", result.file, result.status);
    }
}

fn health(state: &AppState) {
    println!("status: ok");
    println!("memory_indexed: {}", !state.index.is_empty());
    println!("collection_count: {}", state.index.chunk_count());
    println!("llm_available: {}", state.gateway.is_configured());
    println!("scorer_available: true");
}
