//! ctxvault - project context store for AI-assisted development
//!
//! Main entry point for the ctxvault CLI.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

mod commands;

use commands::{agents, config, contexts, init, migrate, stats, transfer};
use ctxvault_config::default_data_dir;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// ctxvault - project context store for AI-assisted development
#[derive(Parser)]
#[command(name = "ctxvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Database configuration file (TOML). Defaults to CTXVAULT_* variables.
    #[arg(long, global = true, env = "CTXVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the store and show what it holds
    Init(init::InitArgs),

    /// Add a context entry
    Add(contexts::AddArgs),

    /// Search context entries
    Search(contexts::SearchArgs),

    /// Show one context entry
    Get(contexts::GetArgs),

    /// Delete a context entry
    Delete(contexts::DeleteArgs),

    /// Show store statistics
    Stats(stats::StatsArgs),

    /// Agent profile management
    Agents(agents::AgentsArgs),

    /// Import a legacy contexts.json store
    Migrate(migrate::MigrateArgs),

    /// Export the full dataset as JSON
    Export(transfer::ExportArgs),

    /// Import a dataset previously exported
    Import(transfer::ImportArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Console (human-readable, stderr) plus a daily-rolling JSON file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(verbose: bool, log_dir: &Path) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "ctxvault=debug,ctxvault_storage=debug,ctxvault_config=debug,info"
    } else {
        "ctxvault=info,ctxvault_storage=info,ctxvault_config=info,warn"
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("ctxvault")
        .filename_suffix("log")
        .build(log_dir)
        .ok();
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "ctxvault=trace,ctxvault_storage=trace,ctxvault_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
                ),
        )
        .with(file_layer)
        .init();

    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = default_data_dir();
    let _guard = init_tracing(cli.verbose, &data_dir.join("logs"));

    let ctx = commands::Context {
        config_path: cli.config,
        data_dir,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Init(args) => init::run(args, &ctx).await,
        Commands::Add(args) => contexts::add(args, &ctx).await,
        Commands::Search(args) => contexts::search(args, &ctx).await,
        Commands::Get(args) => contexts::get(args, &ctx).await,
        Commands::Delete(args) => contexts::delete(args, &ctx).await,
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Agents(args) => agents::run(args, &ctx).await,
        Commands::Migrate(args) => migrate::run(args, &ctx).await,
        Commands::Export(args) => transfer::export(args, &ctx).await,
        Commands::Import(args) => transfer::import(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
