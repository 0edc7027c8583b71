//! Context entry commands: add, search, get, delete.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde_json::json;

use ctxvault_types::{ContextEntry, ContextType, GLOBAL_PROJECT, NewContext, SearchOptions};

use super::{Context, print_json, truncate};

/// Arguments for the add command.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Entry content
    pub content: String,

    /// Owning project path
    #[arg(short, long, default_value = GLOBAL_PROJECT)]
    pub project: String,

    /// Entry type: conversation, decision, code, issue, custom, note, reference
    #[arg(short = 't', long = "type", default_value = "note")]
    pub context_type: ContextType,

    /// Importance from 1 to 10
    #[arg(short, long, default_value = "5")]
    pub importance: u8,

    /// Tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Case-insensitive text matched against content and tags
    #[arg(default_value = "")]
    pub query: String,

    /// Only entries of this project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Only entries of this type ("all" for every type)
    #[arg(short = 't', long = "type")]
    pub context_type: Option<String>,

    /// Entries carrying any of these tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Inclusive importance floor
    #[arg(long)]
    pub min_importance: Option<u8>,

    /// Maximum results to return
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Results to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Context entry ID
    pub id: String,
}

/// Arguments for the delete command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Context entry ID
    pub id: String,
}

impl SearchArgs {
    fn options(&self) -> Result<SearchOptions> {
        let context_type = match self.context_type.as_deref() {
            None | Some("all") => None,
            Some(name) => Some(name.parse::<ContextType>()?),
        };
        Ok(SearchOptions {
            context_type,
            project_path: self.project.clone(),
            tags: self.tags.clone(),
            min_importance: self.min_importance,
            limit: Some(self.limit),
            offset: self.offset,
            query: None,
        })
    }
}

/// Run the add command.
pub async fn add(args: AddArgs, ctx: &Context) -> Result<()> {
    let new = NewContext::new(args.project, args.context_type, args.content)
        .with_importance(args.importance)
        .with_tags(args.tags);

    let db = ctx.open_database().await?;
    let result = db.add_context(new).await;
    db.shutdown().await?;
    let id = result?;

    if ctx.json_output {
        print_json(&json!({ "id": id }))
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();
        println!("{} Context added: {}", green.apply_to("✓"), dim.apply_to(&id));
        Ok(())
    }
}

/// Run the search command.
pub async fn search(args: SearchArgs, ctx: &Context) -> Result<()> {
    let options = args.options()?;
    let dim = Style::new().dim();

    if ctx.verbose && !ctx.json_output {
        println!(
            "{}",
            dim.apply_to(format!(
                "Searching: \"{}\" (limit: {}, offset: {})",
                args.query, args.limit, args.offset
            ))
        );
        println!();
    }

    let db = ctx.open_database().await?;
    let result = db.search_contexts(&args.query, &options).await;
    db.shutdown().await?;
    let entries = result?;

    if ctx.json_output {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("{}", dim.apply_to("No matching contexts"));
        return Ok(());
    }

    println!("{}", style("Contexts").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    for entry in &entries {
        print_summary(entry);
    }
    Ok(())
}

/// Run the get command.
pub async fn get(args: GetArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.get_context_by_id(&args.id).await;
    db.shutdown().await?;

    let Some(entry) = result? else {
        bail!("context not found: {}", args.id);
    };

    if ctx.json_output {
        return print_json(&entry);
    }

    let dim = Style::new().dim();
    println!("{}", style("Context").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("  {} {}", dim.apply_to("ID:"), entry.id);
    println!("  {} {}", dim.apply_to("Project:"), entry.project_path);
    println!("  {} {}", dim.apply_to("Type:"), entry.context_type);
    println!("  {} {}", dim.apply_to("Importance:"), entry.importance);
    println!("  {} {}", dim.apply_to("Created:"), entry.timestamp.to_rfc3339());
    if !entry.tags.is_empty() {
        println!("  {} {}", dim.apply_to("Tags:"), entry.tags.join(", "));
    }
    println!();
    println!("{}", entry.content);
    Ok(())
}

/// Run the delete command.
pub async fn delete(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open_database().await?;
    let result = db.delete_context(&args.id).await;
    db.shutdown().await?;
    result?;

    if ctx.json_output {
        print_json(&json!({ "deleted": args.id }))
    } else {
        let green = Style::new().green();
        println!("{} Context deleted: {}", green.apply_to("✓"), args.id);
        Ok(())
    }
}

fn print_summary(entry: &ContextEntry) {
    let dim = Style::new().dim();
    println!(
        "{} {} {}",
        dim.apply_to(format!("[{}]", short_id(&entry.id))),
        style(entry.context_type).cyan(),
        truncate(&entry.content, 60)
    );
    println!(
        "   {}",
        dim.apply_to(format!(
            "{} · importance {} · {}",
            entry.project_path,
            entry.importance,
            entry.timestamp.format("%Y-%m-%d %H:%M")
        ))
    );
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
