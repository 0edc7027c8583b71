//! Configuration error types.

use ctxvault_types::BackendKind;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating a backend configuration.
///
/// These are fatal for the caller: the configuration must be fixed before any
/// connection is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The declared kind has no corresponding payload section.
    #[error("backend kind '{kind}' requires a [{payload}] section")]
    MissingPayload {
        kind: BackendKind,
        payload: &'static str,
    },

    /// Payloads or settings that cannot be combined.
    #[error("contradictory configuration: {0}")]
    Contradictory(String),

    /// A field holds an unusable value.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// Unrecognized backend kind name.
    #[error("unknown backend kind '{0}'")]
    UnknownKind(String),

    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
