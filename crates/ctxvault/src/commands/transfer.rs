//! Export and import of the full dataset.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;

use ctxvault_types::DataSnapshot;

use super::{Context, print_json};

/// Arguments for the export command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the import command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File written by `ctxvault export`
    pub file: PathBuf,
}

/// Run the export command.
pub async fn export(args: ExportArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.export_data().await;
    db.shutdown().await?;
    let snapshot = result?;

    let Some(path) = args.output else {
        return print_json(&snapshot);
    };

    let body = serde_json::to_vec_pretty(&snapshot)?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    if ctx.json_output {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "contexts": snapshot.contexts.len(),
            "agents": snapshot.agents.len(),
        }))
    } else {
        let green = Style::new().green();
        println!(
            "{} Exported {} contexts and {} agents to {}",
            green.apply_to("✓"),
            snapshot.contexts.len(),
            snapshot.agents.len(),
            path.display()
        );
        Ok(())
    }
}

/// Run the import command.
pub async fn import(args: ImportArgs, ctx: &Context) -> Result<()> {
    let raw = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let snapshot: DataSnapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a ctxvault export", args.file.display()))?;

    let db = ctx.open_database().await?;
    let result = db.import_data(snapshot).await;
    db.shutdown().await?;
    let report = result?;

    if ctx.json_output {
        print_json(&report)
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();
        println!(
            "{} Imported {} contexts and {} agents {}",
            green.apply_to("✓"),
            report.contexts_imported,
            report.agents_imported,
            dim.apply_to(format!("({} already present)", report.skipped))
        );
        Ok(())
    }
}
