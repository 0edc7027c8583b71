//! Migrate command - one-time import of a legacy contexts.json store.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;
use serde_json::json;

use ctxvault_config::MIGRATION_MARKER_FILE;
use ctxvault_storage::{LegacyMigrator, MigrationOutcome};

use super::{Context, print_json};

/// Arguments for the migrate command.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Legacy store to read
    #[arg(long)]
    pub legacy: PathBuf,

    /// Completion marker (default: beside the active store)
    #[arg(long)]
    pub marker: Option<PathBuf>,

    /// Exit with an error if any record failed to migrate
    #[arg(long)]
    pub strict: bool,
}

/// Run the migrate command.
pub async fn run(args: MigrateArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;

    let marker = args.marker.unwrap_or_else(|| {
        db.storage_paths()
            .first()
            .and_then(|path| path.parent())
            .unwrap_or(&ctx.data_dir)
            .join(MIGRATION_MARKER_FILE)
    });
    let migrator = LegacyMigrator::new(&args.legacy, marker);

    let result = db.migrate(&migrator).await;
    db.shutdown().await?;
    let outcome = result?;

    let green = Style::new().green();
    let dim = Style::new().dim();
    match &outcome {
        MigrationOutcome::AlreadyCompleted if ctx.json_output => {
            print_json(&json!({ "status": "already-completed" }))?;
        }
        MigrationOutcome::AlreadyCompleted => {
            println!(
                "{} Migration already completed {}",
                green.apply_to("✓"),
                dim.apply_to(format!("(marker: {})", migrator.marker_path().display()))
            );
        }
        MigrationOutcome::NoLegacyData if ctx.json_output => {
            print_json(&json!({ "status": "no-legacy-data" }))?;
        }
        MigrationOutcome::NoLegacyData => {
            println!(
                "{} No legacy store at {}",
                green.apply_to("✓"),
                args.legacy.display()
            );
        }
        MigrationOutcome::Migrated(report) if ctx.json_output => {
            print_json(&json!({ "status": "migrated", "report": report }))?;
        }
        MigrationOutcome::Migrated(report) => {
            println!(
                "{} Migrated {} contexts and {} agents {}",
                green.apply_to("✓"),
                report.contexts_migrated,
                report.agents_migrated,
                dim.apply_to(format!(
                    "({} skipped, {} failed)",
                    report.skipped, report.failed
                ))
            );
            if let Some(backup) = &report.backup_path {
                println!("  {} {}", dim.apply_to("Backup:"), backup.display());
            }
        }
    }

    if let (true, MigrationOutcome::Migrated(report)) = (args.strict, &outcome) {
        report.ensure_complete()?;
    }
    Ok(())
}
