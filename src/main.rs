//! BIAN Graph Loader - command line
//!
//! Thin non-interactive wrapper over the import pipeline and the run registry.
//! Results are printed as JSON on stdout; logs go to stderr.

use anyhow::Result;
use bian_graph_loader::ingest::{
    Category, DeleteMode, IngestError, PipelineInputs, WIPE_CONFIRMATION,
};
use bian_graph_loader::neo4j::{GraphStats, GraphStore};
use bian_graph_loader::{Config, LoaderState};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bian-loader")]
#[command(about = "Load the BIAN reference model into Neo4j")]
struct Cli {
    /// Path to config.yaml (defaults to ./config.yaml)
    #[arg(long, global = true, env = "BIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full import: constraints, hierarchy, enrichment, specifications
    Import,

    /// Create the uniqueness constraints only
    Constraints,

    /// Node and relationship counts
    Stats,

    /// List import runs, most recent first
    Runs,

    /// Delete everything a run created (preview unless --execute)
    DeleteRun {
        /// Run id, e.g. bian-20260301-101530
        run_id: String,

        /// Actually delete; without it only counts are shown
        #[arg(long)]
        execute: bool,
    },

    /// Delete all nodes of a category: hierarchy, specification or reference
    DeleteCategory {
        category: String,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Delete every node in the database
    Wipe {
        /// Must be exactly "DELETE ALL"
        #[arg(long)]
        confirm: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing (stderr keeps stdout for results)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,bian_graph_loader=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            cli.log_json
                .then(|| fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.log_json).then(|| fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Import => run_import(config).await,
        Commands::Constraints => {
            let state = LoaderState::new(config).await?;
            print_json(&state.constraints().ensure_constraints().await?)
        }
        Commands::Stats => run_stats(config).await,
        Commands::Runs => {
            let state = LoaderState::new(config).await?;
            print_json(&state.registry().list_runs().await?)
        }
        Commands::DeleteRun { run_id, execute } => {
            let state = LoaderState::new(config).await?;
            let mode = if execute {
                DeleteMode::Execute
            } else {
                DeleteMode::Preview
            };
            let deletion = state.registry().delete_run(&run_id, mode).await?;
            if !execute {
                tracing::info!("Preview only. Re-run with --execute to delete run {}", run_id);
            }
            print_json(&deletion)
        }
        Commands::DeleteCategory { category, yes } => {
            let category: Category = category.parse()?;
            if !yes {
                return Err(IngestError::ConfirmationRequired { expected: "--yes" }.into());
            }
            let state = LoaderState::new(config).await?;
            let deletion = state.registry().delete_category(category).await?;
            state.constraints().ensure_constraints().await?;
            print_json(&deletion)
        }
        Commands::Wipe { confirm } => {
            if confirm != WIPE_CONFIRMATION {
                return Err(IngestError::ConfirmationRequired {
                    expected: WIPE_CONFIRMATION,
                }
                .into());
            }
            let state = LoaderState::new(config).await?;
            let deleted = state.registry().wipe_all(&confirm).await?;
            state.constraints().ensure_constraints().await?;
            print_json(&serde_json::json!({ "deleted_nodes": deleted }))
        }
    }
}

async fn run_import(config: Config) -> Result<()> {
    let inputs = PipelineInputs::load(&config.source_locations()).await?;
    let state = LoaderState::new(config).await?;
    tracing::info!("Connected to Neo4j");

    // Ctrl-C stops the pipeline between records
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current record");
            stop_signal.store(true, Ordering::SeqCst);
        }
    });

    let report = state.pipeline().with_stop_flag(stop).run(&inputs).await?;
    print_json(&report)
}

#[derive(Serialize)]
struct StatsView {
    reference_nodes: usize,
    other_nodes: usize,
    #[serde(flatten)]
    stats: GraphStats,
}

async fn run_stats(config: Config) -> Result<()> {
    let state = LoaderState::new(config).await?;
    let stats = state.graph.graph_stats().await?;
    print_json(&StatsView {
        reference_nodes: stats.reference_nodes(),
        other_nodes: stats.other_nodes(),
        stats,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
