//! Stats command - store statistics.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use ctxvault_types::{ContextType, StatsFilter};

use super::{Context, print_json};

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Only count entries of this project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Only count entries of this type
    #[arg(short = 't', long = "type")]
    pub context_type: Option<ContextType>,
}

/// Run the stats command.
pub async fn run(args: StatsArgs, ctx: &Context) -> Result<()> {
    let filter = StatsFilter {
        project_path: args.project,
        context_type: args.context_type,
    };
    let filter = (filter != StatsFilter::default()).then_some(filter);

    let db = ctx.open_database().await?;
    let result = db.get_stats(filter.as_ref()).await;
    db.shutdown().await?;
    let stats = result?;

    if ctx.json_output {
        return print_json(&stats);
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Store Statistics").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Backend:"), stats.adapter);
    println!("  {} {}", dim.apply_to("Contexts:"), stats.total_contexts);
    println!("  {} {}", dim.apply_to("Agents:"), stats.total_agents);
    if let Some(bytes) = stats.storage_size_bytes {
        println!("  {} {} bytes", dim.apply_to("Size:"), bytes);
    }
    if let Some(last_sync) = stats.last_sync {
        println!("  {} {}", dim.apply_to("Last sync:"), last_sync.to_rfc3339());
    }

    if !stats.by_type.is_empty() {
        println!();
        println!("  {}", style("By type").bold());
        for (name, count) in &stats.by_type {
            println!("    {:<14} {}", name, count);
        }
    }
    if !stats.by_project.is_empty() {
        println!();
        println!("  {}", style("By project").bold());
        for (project, count) in &stats.by_project {
            println!("    {:<40} {}", project, count);
        }
    }
    println!();
    Ok(())
}
