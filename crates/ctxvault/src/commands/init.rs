//! Init command - create the store and report what it holds.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::{Context, print_json};

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also insert the standard agent profiles under their stable ids
    #[arg(long)]
    pub standard_agents: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitOutput {
    backend: String,
    storage_paths: Vec<String>,
    contexts: usize,
    agents: usize,
    healthy: bool,
}

/// Run the init command.
pub async fn run(args: InitArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;

    if args.standard_agents {
        db.populate_standard_agents().await?;
    }
    let stats = db.get_stats(None).await?;
    let output = InitOutput {
        backend: db.kind().to_string(),
        storage_paths: db
            .storage_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        contexts: stats.total_contexts,
        agents: stats.total_agents,
        healthy: db.health_check().await,
    };
    db.shutdown().await?;

    if ctx.json_output {
        return print_json(&output);
    }

    let green = Style::new().green();
    let dim = Style::new().dim();
    println!();
    println!("{}", style("ctxvault store").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Backend:"), output.backend);
    for path in &output.storage_paths {
        println!("  {} {}", dim.apply_to("Path:"), path);
    }
    println!("  {} {}", dim.apply_to("Contexts:"), output.contexts);
    println!("  {} {}", dim.apply_to("Agents:"), output.agents);
    if output.healthy {
        println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● ready"));
    } else {
        let red = Style::new().red();
        println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● unhealthy"));
    }
    println!();
    Ok(())
}
