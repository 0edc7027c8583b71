//! Default locations for store files.
//!
//! # Environment Variables
//!
//! - `CTXVAULT_DATA_DIR` - Override the directory holding every store file

use std::path::PathBuf;

/// File name of the JSON document store.
pub const DOCUMENT_FILE_NAME: &str = "context-db.json";

/// File name of the SQLite store.
pub const RELATIONAL_FILE_NAME: &str = "context.db";

/// File name of the pre-adapter flat store that migration upgrades from.
pub const LEGACY_FILE_NAME: &str = "contexts.json";

/// Marker written once legacy migration has completed.
pub const MIGRATION_MARKER_FILE: &str = ".migration-complete";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CTXVAULT_DATA_DIR";

/// Get the effective data directory.
///
/// Resolution order:
/// 1. `CTXVAULT_DATA_DIR` environment variable
/// 2. Default: `~/.ctxvault`
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    home_data_dir()
}

pub(crate) fn home_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ctxvault")
}
