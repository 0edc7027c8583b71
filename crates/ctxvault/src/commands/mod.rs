//! CLI command handlers.

pub mod agents;
pub mod config;
pub mod contexts;
pub mod init;
pub mod migrate;
pub mod stats;
pub mod transfer;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Serialize;

use ctxvault_config::DatabaseConfig;
use ctxvault_storage::ContextDatabase;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit configuration file; `None` reads `CTXVAULT_*` variables.
    pub config_path: Option<PathBuf>,
    /// Data directory used for logs and environment defaults.
    pub data_dir: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn load_config(&self) -> Result<DatabaseConfig> {
        match &self.config_path {
            Some(path) => DatabaseConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display())),
            None => DatabaseConfig::from_env().context("reading CTXVAULT_* configuration"),
        }
    }

    /// Build and initialize the configured database.
    pub async fn open_database(&self) -> Result<ContextDatabase> {
        let db = ContextDatabase::new(self.load_config()?)?;
        db.initialize().await?;
        Ok(db)
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line\nbreak", 20), "line break");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
