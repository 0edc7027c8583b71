//! Backend configuration for the ctxvault context store.
//!
//! A [`DatabaseConfig`] selects exactly one backend kind and carries that
//! kind's connection parameters. Configs come from TOML files, from the
//! environment, or from one of the scenario presets, and are always passed
//! explicitly to the components that need them.
//!
//! [`DatabaseConfig::validate`] pre-flights a config without connecting and
//! yields a [`BackendSpec`] the storage factory builds from.

pub mod env;
pub mod error;
pub mod paths;
pub mod presets;
pub mod types;

pub use error::{ConfigError, Result};
pub use paths::{
    default_data_dir, DATA_DIR_ENV, DOCUMENT_FILE_NAME, LEGACY_FILE_NAME, MIGRATION_MARKER_FILE,
    RELATIONAL_FILE_NAME,
};
pub use presets::SOLO_DEV_MAX_ENTRIES;
pub use types::*;

pub use ctxvault_types::BackendKind;
