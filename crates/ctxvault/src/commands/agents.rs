//! Agents command - agent profile management.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use serde_json::json;

use ctxvault_types::{DatabaseAgent, NewAgent};

use super::{Context, print_json, truncate};

/// Arguments for the agents command.
#[derive(Args, Debug)]
pub struct AgentsArgs {
    #[command(subcommand)]
    pub command: AgentsCommand,
}

#[derive(Subcommand, Debug)]
pub enum AgentsCommand {
    /// List all agent profiles
    List,

    /// Add a custom agent profile
    Add {
        /// Unique profile name
        name: String,

        /// What the agent specializes in
        #[arg(short, long)]
        description: String,

        /// Display emoji
        #[arg(long)]
        emoji: Option<String>,

        /// Specializations (repeatable)
        #[arg(short, long = "specialization")]
        specializations: Vec<String>,

        /// Display color, e.g. "#4A90D9"
        #[arg(long)]
        color: Option<String>,

        /// System prompt for the profile
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Delete a custom agent profile
    Delete {
        /// Agent ID
        id: String,
    },

    /// Insert the standard profiles under their stable ids
    Populate,

    /// Check that the canonical profiles exist and are complete
    Validate,
}

/// Run the agents command.
pub async fn run(args: AgentsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AgentsCommand::List => cmd_list(ctx).await,
        AgentsCommand::Add {
            name,
            description,
            emoji,
            specializations,
            color,
            prompt,
        } => {
            let agent = NewAgent {
                emoji,
                specializations,
                color,
                prompt,
                ..NewAgent::custom(name, description)
            };
            cmd_add(agent, ctx).await
        }
        AgentsCommand::Delete { id } => cmd_delete(&id, ctx).await,
        AgentsCommand::Populate => cmd_populate(ctx).await,
        AgentsCommand::Validate => cmd_validate(ctx).await,
    }
}

async fn cmd_list(ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.get_all_agents().await;
    db.shutdown().await?;
    let agents = result?;

    if ctx.json_output {
        return print_json(&agents);
    }

    let dim = Style::new().dim();
    println!("{}", style("Agents").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    if agents.is_empty() {
        println!("{}", dim.apply_to("No agents found"));
    }
    for agent in &agents {
        print_agent(agent);
    }
    Ok(())
}

async fn cmd_add(agent: NewAgent, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.add_agent(agent).await;
    db.shutdown().await?;
    let id = result?;

    if ctx.json_output {
        print_json(&json!({ "id": id }))
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();
        println!("{} Agent added: {}", green.apply_to("✓"), dim.apply_to(&id));
        Ok(())
    }
}

async fn cmd_delete(id: &str, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.delete_agent(id).await;
    db.shutdown().await?;
    result?;

    if ctx.json_output {
        print_json(&json!({ "deleted": id }))
    } else {
        let green = Style::new().green();
        println!("{} Agent deleted: {}", green.apply_to("✓"), id);
        Ok(())
    }
}

async fn cmd_populate(ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.populate_standard_agents().await;
    db.shutdown().await?;
    let report = result?;

    if ctx.json_output {
        print_json(&report)
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();
        println!(
            "{} Standard agents: {} inserted {}",
            green.apply_to("✓"),
            report.inserted,
            dim.apply_to(format!("({} skipped)", report.skipped))
        );
        Ok(())
    }
}

async fn cmd_validate(ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.validate_agents().await;
    db.shutdown().await?;
    let report = result?;

    if ctx.json_output {
        print_json(&report)?;
    } else {
        let dim = Style::new().dim();
        if report.passed {
            let green = Style::new().green();
            println!(
                "{} {} agents, canonical profiles present",
                green.apply_to("✓"),
                report.agent_count
            );
        } else {
            let red = Style::new().red();
            println!("{} Agent validation failed", red.apply_to("✗"));
            for name in &report.missing_canonical {
                println!("  {} {}", dim.apply_to("missing:"), name);
            }
            for agent in &report.incomplete_agents {
                println!(
                    "  {} {} ({})",
                    dim.apply_to("incomplete:"),
                    agent.id,
                    agent.missing_fields.join(", ")
                );
            }
        }
    }

    if report.passed {
        Ok(())
    } else {
        anyhow::bail!("agent validation failed")
    }
}

fn print_agent(agent: &DatabaseAgent) {
    let dim = Style::new().dim();
    let marker = if agent.is_custom { "custom" } else { "seed" };
    println!(
        "{} {} {}",
        agent.emoji.as_deref().unwrap_or("•"),
        style(&agent.name).bold(),
        dim.apply_to(format!("[{}] {}", marker, agent.id))
    );
    println!("   {}", truncate(&agent.description, 70));
    if !agent.specializations.is_empty() {
        println!("   {}", dim.apply_to(agent.specializations.join(", ")));
    }
    if !agent.enabled {
        println!("   {}", dim.apply_to("(disabled)"));
    }
    println!();
}
