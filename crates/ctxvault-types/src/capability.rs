//! Backend kinds and the optional capabilities a backend can advertise.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Physical backend behind the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Single JSON file with debounced atomic flushes.
    #[serde(alias = "json")]
    Document,
    /// SQLite database file opened directly.
    #[serde(alias = "sqlite")]
    Relational,
    /// In-memory SQLite engine re-serialized to a file after every mutation.
    #[serde(alias = "sqlite-embedded")]
    EmbeddedRelational,
    /// A primary backend with a mirrored secondary.
    Hybrid,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Relational => "relational",
            BackendKind::EmbeddedRelational => "embedded-relational",
            BackendKind::Hybrid => "hybrid",
        }
    }

    /// Whether this kind is one of the SQLite-backed variants.
    pub fn is_relational(&self) -> bool {
        matches!(self, BackendKind::Relational | BackendKind::EmbeddedRelational)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "json" => Ok(BackendKind::Document),
            "relational" | "sqlite" => Ok(BackendKind::Relational),
            "embedded-relational" | "sqlite-embedded" | "embedded" => {
                Ok(BackendKind::EmbeddedRelational)
            }
            "hybrid" => Ok(BackendKind::Hybrid),
            other => Err(ValidationError::UnknownBackendKind(other.to_string())),
        }
    }
}

/// An optional operation a backend may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ExportImport,
    VectorSearch,
    Sync,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ExportImport => f.write_str("export/import"),
            Capability::VectorSearch => f.write_str("vector search"),
            Capability::Sync => f.write_str("cross-adapter sync"),
        }
    }
}

/// Capability flags advertised by a backend. Callers probe these before
/// invoking an optional operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub export_import: bool,
    pub vector_search: bool,
    pub sync: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::ExportImport => self.export_import,
            Capability::VectorSearch => self.vector_search,
            Capability::Sync => self.sync,
        }
    }
}
