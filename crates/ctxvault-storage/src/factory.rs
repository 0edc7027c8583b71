//! Resolve a configuration into a concrete, not yet connected adapter.

use tracing::debug;

use ctxvault_config::{BackendSpec, DatabaseConfig};

use crate::adapter::DatabaseAdapter;
use crate::document::DocumentAdapter;
use crate::error::Result;
use crate::hybrid::HybridAdapter;
use crate::relational::RelationalAdapter;

/// Validate `config` and build its adapter.
///
/// # Errors
///
/// [`StorageError::Configuration`](crate::StorageError::Configuration) when a
/// payload is missing or the config contradicts itself.
pub fn create_adapter(config: &DatabaseConfig) -> Result<Box<dyn DatabaseAdapter>> {
    let spec = validate_config(config)?;
    Ok(build_adapter(spec))
}

/// Pre-flight a config without constructing anything.
pub fn validate_config(config: &DatabaseConfig) -> Result<BackendSpec> {
    Ok(config.validate()?)
}

/// Derive a config from `CTXVAULT_*` variables and build its adapter.
pub fn adapter_from_env() -> Result<Box<dyn DatabaseAdapter>> {
    create_adapter(&DatabaseConfig::from_env()?)
}

/// Build the adapter for an already validated spec.
pub fn build_adapter(spec: BackendSpec) -> Box<dyn DatabaseAdapter> {
    debug!(kind = %spec.kind(), "Building adapter");
    match spec {
        BackendSpec::Document(config) => Box::new(DocumentAdapter::new(config)),
        BackendSpec::Relational(config) => Box::new(RelationalAdapter::native(config)),
        BackendSpec::EmbeddedRelational(config) => Box::new(RelationalAdapter::embedded(config)),
        BackendSpec::Hybrid {
            primary,
            secondary,
            mirror_writes,
        } => Box::new(HybridAdapter::new(
            build_adapter(*primary),
            build_adapter(*secondary),
            mirror_writes,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use ctxvault_config::{BackendKind, ConfigError};

    #[test]
    fn test_missing_payload_is_configuration_error() {
        let config = DatabaseConfig {
            kind: BackendKind::Relational,
            document: None,
            relational: None,
            hybrid: None,
        };
        assert!(matches!(
            create_adapter(&config),
            Err(StorageError::Configuration(ConfigError::MissingPayload { .. }))
        ));
    }

    #[test]
    fn test_adapter_kind_follows_config() {
        let dir = std::path::Path::new("/tmp/ctxvault-factory");
        assert_eq!(
            create_adapter(&DatabaseConfig::solo_dev(dir)).unwrap().kind(),
            BackendKind::Document
        );
        assert_eq!(
            create_adapter(&DatabaseConfig::production(dir)).unwrap().kind(),
            BackendKind::Relational
        );
        assert_eq!(
            create_adapter(&DatabaseConfig::team(dir)).unwrap().kind(),
            BackendKind::Hybrid
        );
    }
}
