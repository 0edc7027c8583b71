//! Environment-derived configuration.
//!
//! # Environment Variables
//!
//! | variable | default |
//! |---|---|
//! | `CTXVAULT_DB_KIND` | `document` |
//! | `CTXVAULT_DATA_DIR` | `~/.ctxvault` |
//! | `CTXVAULT_DB_PATH` | `<data dir>/context-db.json` or `<data dir>/context.db` |
//! | `CTXVAULT_DB_MAX_ENTRIES` | `10000` |
//! | `CTXVAULT_DB_DEBOUNCE_MS` | `100` |
//! | `CTXVAULT_DB_HOST` | `localhost` |
//! | `CTXVAULT_DB_PORT` | `5432` |
//! | `CTXVAULT_DB_NAME` | `ctxvault` |
//! | `CTXVAULT_DB_USER` | `ctxvault` |
//! | `CTXVAULT_DB_PASSWORD` | unset |
//! | `CTXVAULT_VECTOR_DIMENSIONS` | unset (no vector search) |
//! | `CTXVAULT_HYBRID_PRIMARY` | `relational` |
//! | `CTXVAULT_HYBRID_SECONDARY` | `document` |
//!
//! In hybrid mode `CTXVAULT_DB_PATH` is ignored and both files live in the
//! data directory.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use ctxvault_types::BackendKind;

use crate::error::{ConfigError, Result};
use crate::paths::{home_data_dir, DATA_DIR_ENV, DOCUMENT_FILE_NAME, RELATIONAL_FILE_NAME};
use crate::types::{
    DatabaseConfig, DocumentConfig, HybridConfig, RelationalConfig, DEFAULT_FLUSH_DEBOUNCE_MS,
    DEFAULT_MAX_ENTRIES,
};

pub const KIND_ENV: &str = "CTXVAULT_DB_KIND";
pub const PATH_ENV: &str = "CTXVAULT_DB_PATH";
pub const MAX_ENTRIES_ENV: &str = "CTXVAULT_DB_MAX_ENTRIES";
pub const DEBOUNCE_ENV: &str = "CTXVAULT_DB_DEBOUNCE_MS";
pub const HOST_ENV: &str = "CTXVAULT_DB_HOST";
pub const PORT_ENV: &str = "CTXVAULT_DB_PORT";
pub const NAME_ENV: &str = "CTXVAULT_DB_NAME";
pub const USER_ENV: &str = "CTXVAULT_DB_USER";
pub const PASSWORD_ENV: &str = "CTXVAULT_DB_PASSWORD";
pub const VECTOR_DIMENSIONS_ENV: &str = "CTXVAULT_VECTOR_DIMENSIONS";
pub const HYBRID_PRIMARY_ENV: &str = "CTXVAULT_HYBRID_PRIMARY";
pub const HYBRID_SECONDARY_ENV: &str = "CTXVAULT_HYBRID_SECONDARY";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DATABASE: &str = "ctxvault";
const DEFAULT_USER: &str = "ctxvault";

impl DatabaseConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let kind = match get(KIND_ENV) {
            Some(raw) => parse_kind(&raw)?,
            None => BackendKind::Document,
        };
        let data_dir = get(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(home_data_dir);
        let explicit_path = get(PATH_ENV).map(PathBuf::from);

        debug!(%kind, data_dir = %data_dir.display(), "Deriving database config from environment");

        let document = |path: Option<PathBuf>| -> Result<DocumentConfig> {
            Ok(DocumentConfig {
                path: path.unwrap_or_else(|| data_dir.join(DOCUMENT_FILE_NAME)),
                max_entries: parse_number(MAX_ENTRIES_ENV, get(MAX_ENTRIES_ENV))?
                    .unwrap_or(DEFAULT_MAX_ENTRIES),
                flush_debounce_ms: parse_number(DEBOUNCE_ENV, get(DEBOUNCE_ENV))?
                    .unwrap_or(DEFAULT_FLUSH_DEBOUNCE_MS),
            })
        };
        let relational = |path: Option<PathBuf>| -> Result<RelationalConfig> {
            Ok(RelationalConfig {
                path: path.unwrap_or_else(|| data_dir.join(RELATIONAL_FILE_NAME)),
                host: Some(get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string())),
                port: Some(parse_number(PORT_ENV, get(PORT_ENV))?.unwrap_or(DEFAULT_PORT)),
                database: Some(get(NAME_ENV).unwrap_or_else(|| DEFAULT_DATABASE.to_string())),
                username: Some(get(USER_ENV).unwrap_or_else(|| DEFAULT_USER.to_string())),
                password: get(PASSWORD_ENV),
                vector_dimensions: parse_number(VECTOR_DIMENSIONS_ENV, get(VECTOR_DIMENSIONS_ENV))?,
            })
        };

        let config = match kind {
            BackendKind::Document => DatabaseConfig::document(document(explicit_path)?),
            BackendKind::Relational => DatabaseConfig::relational(relational(explicit_path)?),
            BackendKind::EmbeddedRelational => {
                DatabaseConfig::embedded_relational(relational(explicit_path)?)
            }
            BackendKind::Hybrid => {
                let primary = match get(HYBRID_PRIMARY_ENV) {
                    Some(raw) => parse_kind(&raw)?,
                    None => BackendKind::Relational,
                };
                let secondary = match get(HYBRID_SECONDARY_ENV) {
                    Some(raw) => parse_kind(&raw)?,
                    None => BackendKind::Document,
                };
                DatabaseConfig::hybrid(
                    document(None)?,
                    relational(None)?,
                    HybridConfig {
                        primary,
                        secondary,
                        mirror_writes: true,
                    },
                )
            }
        };

        Ok(config)
    }
}

fn parse_kind(raw: &str) -> Result<BackendKind> {
    BackendKind::from_str(raw).map_err(|_| ConfigError::UnknownKind(raw.to_string()))
}

fn parse_number<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::invalid(key, format!("'{value}' is not a valid number")))
    })
    .transpose()
}
