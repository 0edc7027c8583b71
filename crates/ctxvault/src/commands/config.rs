//! Config command - configuration checks.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;

use ctxvault_storage::validate_config;

use super::{Context, print_json};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration without opening the store
    Check,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOutput {
    valid: bool,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<String>,
    storage_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Check => cmd_check(ctx).await,
    }
}

async fn cmd_check(ctx: &Context) -> Result<()> {
    let source = match &ctx.config_path {
        Some(path) => path.display().to_string(),
        None => "environment".to_string(),
    };

    let checked = ctx
        .load_config()
        .and_then(|config| Ok(validate_config(&config)?));
    let output = match &checked {
        Ok(spec) => CheckOutput {
            valid: true,
            source,
            backend: Some(spec.kind().to_string()),
            storage_paths: spec
                .storage_paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            error: None,
        },
        Err(e) => CheckOutput {
            valid: false,
            source,
            backend: None,
            storage_paths: Vec::new(),
            error: Some(format!("{e:#}")),
        },
    };

    if ctx.json_output {
        print_json(&output)?;
    } else {
        let dim = Style::new().dim();
        println!("{}", style("Configuration").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} {}", dim.apply_to("Source:"), output.source);
        if let Some(backend) = &output.backend {
            println!("  {} {}", dim.apply_to("Backend:"), backend);
        }
        for path in &output.storage_paths {
            println!("  {} {}", dim.apply_to("Path:"), path);
        }
        if output.valid {
            let green = Style::new().green();
            println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● valid"));
        } else {
            let red = Style::new().red();
            println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● invalid"));
        }
    }

    checked.map(|_| ())
}
