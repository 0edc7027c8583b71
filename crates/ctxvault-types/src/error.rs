//! Validation errors for entity values.

use thiserror::Error;

/// Result type alias for entity validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// A value failed the contract-level checks shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Importance outside the 1..=10 range.
    #[error("importance {0} is outside the allowed range 1..=10")]
    ImportanceOutOfRange(u8),

    /// A required text field was empty.
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// Unrecognized context type name.
    #[error("unknown context type '{0}'")]
    UnknownContextType(String),

    /// Unrecognized backend kind name.
    #[error("unknown backend kind '{0}'")]
    UnknownBackendKind(String),
}
