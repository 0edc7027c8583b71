//! Backend configuration mapping to the TOML schema.
//!
//! ```toml
//! kind = "hybrid"
//!
//! [document]
//! path = "~/.ctxvault/context-db.json"
//! max_entries = 1000
//!
//! [relational]
//! path = "~/.ctxvault/context.db"
//! vector_dimensions = 384
//!
//! [hybrid]
//! primary = "relational"
//! secondary = "document"
//! ```
//!
//! A config declares one `kind` and carries the payload section that kind
//! needs. [`DatabaseConfig::validate`] turns it into a [`BackendSpec`], which
//! can only represent complete configurations.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ctxvault_types::BackendKind;

use crate::error::{ConfigError, Result};

/// Default soft capacity of a document store.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default delay between the last mutation and the durable flush.
pub const DEFAULT_FLUSH_DEBOUNCE_MS: u64 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration: a backend kind plus its connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub kind: BackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relational: Option<RelationalConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid: Option<HybridConfig>,
}

/// Parameters of the JSON document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Path of the JSON file.
    pub path: PathBuf,

    /// Soft capacity. Exceeding it logs a warning; inserts still succeed.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Delay between the last mutation and the durable flush, in milliseconds.
    #[serde(default = "default_flush_debounce_ms")]
    pub flush_debounce_ms: u64,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_flush_debounce_ms() -> u64 {
    DEFAULT_FLUSH_DEBOUNCE_MS
}

impl DocumentConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            flush_debounce_ms: DEFAULT_FLUSH_DEBOUNCE_MS,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_flush_debounce_ms(mut self, ms: u64) -> Self {
        self.flush_debounce_ms = ms;
        self
    }
}

/// Parameters of the SQLite stores.
///
/// `host`, `port`, `database` and the credentials are connection hints kept
/// for diagnostics; both SQLite variants open `path`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Embedding width. Vector search is only offered when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_dimensions: Option<usize>,
}

impl RelationalConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            vector_dimensions: None,
        }
    }

    pub fn with_vector_dimensions(mut self, dims: usize) -> Self {
        self.vector_dimensions = Some(dims);
        self
    }

    /// `user@host:port/database`, omitting unset parts. Never includes the password.
    pub fn connection_label(&self) -> String {
        let mut label = String::new();
        if let Some(user) = &self.username {
            label.push_str(user);
            label.push('@');
        }
        label.push_str(self.host.as_deref().unwrap_or("local"));
        if let Some(port) = self.port {
            label.push_str(&format!(":{port}"));
        }
        if let Some(db) = &self.database {
            label.push('/');
            label.push_str(db);
        }
        label
    }
}

impl fmt::Debug for RelationalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalConfig")
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("vector_dimensions", &self.vector_dimensions)
            .finish()
    }
}

/// Composition of two backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridConfig {
    pub primary: BackendKind,
    pub secondary: BackendKind,

    /// Mirror every mutation into the secondary.
    #[serde(default = "default_mirror_writes")]
    pub mirror_writes: bool,
}

fn default_mirror_writes() -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Validated form
// ─────────────────────────────────────────────────────────────────────────────

/// A complete, validated backend description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSpec {
    Document(DocumentConfig),
    Relational(RelationalConfig),
    EmbeddedRelational(RelationalConfig),
    Hybrid {
        primary: Box<BackendSpec>,
        secondary: Box<BackendSpec>,
        mirror_writes: bool,
    },
}

impl BackendSpec {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSpec::Document(_) => BackendKind::Document,
            BackendSpec::Relational(_) => BackendKind::Relational,
            BackendSpec::EmbeddedRelational(_) => BackendKind::EmbeddedRelational,
            BackendSpec::Hybrid { .. } => BackendKind::Hybrid,
        }
    }

    /// Every file this backend reads or writes.
    pub fn storage_paths(&self) -> Vec<PathBuf> {
        match self {
            BackendSpec::Document(doc) => vec![doc.path.clone()],
            BackendSpec::Relational(rel) | BackendSpec::EmbeddedRelational(rel) => {
                vec![rel.path.clone()]
            }
            BackendSpec::Hybrid {
                primary, secondary, ..
            } => {
                let mut paths = primary.storage_paths();
                paths.extend(secondary.storage_paths());
                paths
            }
        }
    }
}

impl DatabaseConfig {
    pub fn document(config: DocumentConfig) -> Self {
        Self {
            kind: BackendKind::Document,
            document: Some(config),
            relational: None,
            hybrid: None,
        }
    }

    pub fn relational(config: RelationalConfig) -> Self {
        Self {
            kind: BackendKind::Relational,
            document: None,
            relational: Some(config),
            hybrid: None,
        }
    }

    pub fn embedded_relational(config: RelationalConfig) -> Self {
        Self {
            kind: BackendKind::EmbeddedRelational,
            ..Self::relational(config)
        }
    }

    pub fn hybrid(document: DocumentConfig, relational: RelationalConfig, hybrid: HybridConfig) -> Self {
        Self {
            kind: BackendKind::Hybrid,
            document: Some(document),
            relational: Some(relational),
            hybrid: Some(hybrid),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Check completeness and consistency without constructing anything.
    pub fn validate(&self) -> Result<BackendSpec> {
        match self.kind {
            BackendKind::Document => {
                self.reject_extra(&["relational", "hybrid"])?;
                Ok(BackendSpec::Document(self.document_payload()?))
            }
            BackendKind::Relational => {
                self.reject_extra(&["document", "hybrid"])?;
                Ok(BackendSpec::Relational(self.relational_payload()?))
            }
            BackendKind::EmbeddedRelational => {
                self.reject_extra(&["document", "hybrid"])?;
                Ok(BackendSpec::EmbeddedRelational(self.relational_payload()?))
            }
            BackendKind::Hybrid => self.validate_hybrid(),
        }
    }

    fn validate_hybrid(&self) -> Result<BackendSpec> {
        let hybrid = self.hybrid.as_ref().ok_or(ConfigError::MissingPayload {
            kind: BackendKind::Hybrid,
            payload: "hybrid",
        })?;

        if hybrid.primary == hybrid.secondary {
            return Err(ConfigError::Contradictory(format!(
                "hybrid primary and secondary are both '{}'",
                hybrid.primary
            )));
        }

        let resolve = |kind: BackendKind| -> Result<BackendSpec> {
            match kind {
                BackendKind::Document => Ok(BackendSpec::Document(self.document_payload()?)),
                BackendKind::Relational => Ok(BackendSpec::Relational(self.relational_payload()?)),
                BackendKind::EmbeddedRelational => {
                    Ok(BackendSpec::EmbeddedRelational(self.relational_payload()?))
                }
                BackendKind::Hybrid => Err(ConfigError::Contradictory(
                    "a hybrid backend cannot contain another hybrid backend".to_string(),
                )),
            }
        };

        let primary = resolve(hybrid.primary)?;
        let secondary = resolve(hybrid.secondary)?;

        // Both relational variants would share the one [relational] section and file.
        if primary.kind().is_relational() == secondary.kind().is_relational() {
            return Err(ConfigError::Contradictory(
                "a hybrid backend must combine one document and one relational backend"
                    .to_string(),
            ));
        }

        Ok(BackendSpec::Hybrid {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
            mirror_writes: hybrid.mirror_writes,
        })
    }

    fn reject_extra(&self, sections: &[&str]) -> Result<()> {
        for section in sections {
            let present = match *section {
                "document" => self.document.is_some(),
                "relational" => self.relational.is_some(),
                "hybrid" => self.hybrid.is_some(),
                _ => false,
            };
            if present {
                return Err(ConfigError::Contradictory(format!(
                    "kind '{}' does not use a [{}] section",
                    self.kind, section
                )));
            }
        }
        Ok(())
    }

    fn document_payload(&self) -> Result<DocumentConfig> {
        let doc = self.document.clone().ok_or(ConfigError::MissingPayload {
            kind: self.kind,
            payload: "document",
        })?;
        if doc.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("document.path", "must not be empty"));
        }
        if doc.max_entries == 0 {
            return Err(ConfigError::invalid("document.max_entries", "must be at least 1"));
        }
        Ok(doc)
    }

    fn relational_payload(&self) -> Result<RelationalConfig> {
        let rel = self.relational.clone().ok_or(ConfigError::MissingPayload {
            kind: self.kind,
            payload: "relational",
        })?;
        if rel.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("relational.path", "must not be empty"));
        }
        if rel.port == Some(0) {
            return Err(ConfigError::invalid("relational.port", "must not be 0"));
        }
        if rel.vector_dimensions == Some(0) {
            return Err(ConfigError::invalid(
                "relational.vector_dimensions",
                "must be at least 1 when set",
            ));
        }
        Ok(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_requires_payload() {
        let config = DatabaseConfig {
            kind: BackendKind::Document,
            document: None,
            relational: None,
            hybrid: None,
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingPayload {
                payload: "document",
                ..
            }
        ));
        assert!(err.to_string().contains("[document]"));
    }

    #[test]
    fn test_relational_rejects_foreign_payload() {
        let mut config = DatabaseConfig::relational(RelationalConfig::new("/tmp/x.db"));
        config.document = Some(DocumentConfig::new("/tmp/x.json"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Contradictory(_))
        ));
    }

    #[test]
    fn test_embedded_uses_relational_payload() {
        let config = DatabaseConfig::embedded_relational(RelationalConfig::new("/tmp/x.db"));
        let spec = config.validate().unwrap();
        assert_eq!(spec.kind(), BackendKind::EmbeddedRelational);
        assert_eq!(spec.storage_paths(), vec![PathBuf::from("/tmp/x.db")]);
    }

    #[test]
    fn test_hybrid_needs_both_payloads() {
        let config = DatabaseConfig {
            kind: BackendKind::Hybrid,
            document: Some(DocumentConfig::new("/tmp/a.json")),
            relational: None,
            hybrid: Some(HybridConfig {
                primary: BackendKind::Relational,
                secondary: BackendKind::Document,
                mirror_writes: true,
            }),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingPayload {
                payload: "relational",
                ..
            })
        ));
    }

    #[test]
    fn test_hybrid_rejects_two_relational_variants() {
        let config = DatabaseConfig::hybrid(
            DocumentConfig::new("/tmp/a.json"),
            RelationalConfig::new("/tmp/a.db"),
            HybridConfig {
                primary: BackendKind::Relational,
                secondary: BackendKind::EmbeddedRelational,
                mirror_writes: false,
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Contradictory(_))
        ));
    }

    #[test]
    fn test_invalid_field_values() {
        let mut rel = RelationalConfig::new("/tmp/x.db");
        rel.port = Some(0);
        assert!(matches!(
            DatabaseConfig::relational(rel).validate(),
            Err(ConfigError::Invalid { .. })
        ));

        let doc = DocumentConfig::new("/tmp/x.json").with_max_entries(0);
        assert!(DatabaseConfig::document(doc).validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = DatabaseConfig::from_toml(
            r#"
            kind = "hybrid"

            [document]
            path = "/data/context-db.json"

            [relational]
            path = "/data/context.db"
            host = "db.internal"
            port = 5432
            vector_dimensions = 384

            [hybrid]
            primary = "relational"
            secondary = "document"
            "#,
        )
        .unwrap();

        let doc = config.document.as_ref().unwrap();
        assert_eq!(doc.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(doc.flush_debounce_ms, DEFAULT_FLUSH_DEBOUNCE_MS);
        assert!(config.hybrid.as_ref().unwrap().mirror_writes);

        match config.validate().unwrap() {
            BackendSpec::Hybrid {
                primary, secondary, ..
            } => {
                assert_eq!(primary.kind(), BackendKind::Relational);
                assert_eq!(secondary.kind(), BackendKind::Document);
            }
            other => panic!("expected hybrid, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_hides_password() {
        let mut rel = RelationalConfig::new("/tmp/x.db");
        rel.password = Some("hunter2".to_string());
        let debug = format!("{rel:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!rel.connection_label().contains("hunter2"));
    }
}
