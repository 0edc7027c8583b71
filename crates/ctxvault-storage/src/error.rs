//! Error types for the storage crate.

use ctxvault_config::ConfigError;
use ctxvault_types::{BackendKind, Capability, ValidationError};
use thiserror::Error;

/// Errors surfaced by adapters, the facade and migration.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The configuration is missing a payload or contradicts itself.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The backing resource is unreachable or unwritable.
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation was attempted before `initialize()` succeeded.
    #[error("database not initialized: call initialize() first")]
    NotInitialized,

    /// The targeted record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Deleting a seed agent, or re-inserting an existing predefined id.
    #[error("{entity} '{name}' is protected")]
    Protected { entity: &'static str, name: String },

    /// A uniqueness rule would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An optional operation the active backend does not offer.
    #[error("{capability} is not supported by the {backend} backend")]
    Unsupported {
        capability: Capability,
        backend: BackendKind,
    },

    /// Migration finished with per-record failures.
    #[error("migration finished with {failed} of {total} records failed")]
    MigrationPartial { failed: usize, total: usize },

    /// A value failed contract validation or a stored row is malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        StorageError::InvalidData(err.to_string())
    }
}

impl StorageError {
    pub(crate) fn context_not_found(id: &str) -> Self {
        StorageError::NotFound {
            entity: "context",
            id: id.to_string(),
        }
    }

    pub(crate) fn agent_not_found(id: &str) -> Self {
        StorageError::NotFound {
            entity: "agent",
            id: id.to_string(),
        }
    }

    pub(crate) fn unsupported(capability: Capability, backend: BackendKind) -> Self {
        StorageError::Unsupported {
            capability,
            backend,
        }
    }

    pub(crate) fn duplicate_agent_name(name: &str) -> Self {
        StorageError::Conflict(format!("an agent named '{name}' already exists"))
    }

    /// Whether the caller can recover by changing its request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. }
                | StorageError::Protected { .. }
                | StorageError::Conflict(_)
                | StorageError::Unsupported { .. }
                | StorageError::MigrationPartial { .. }
                | StorageError::InvalidData(_)
        )
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
