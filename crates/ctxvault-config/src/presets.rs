//! Scenario presets.

use std::path::Path;

use ctxvault_types::BackendKind;

use crate::paths::{DOCUMENT_FILE_NAME, RELATIONAL_FILE_NAME};
use crate::types::{DatabaseConfig, DocumentConfig, HybridConfig, RelationalConfig};

/// Soft capacity of the solo-development document store.
pub const SOLO_DEV_MAX_ENTRIES: usize = 1_000;

impl DatabaseConfig {
    /// Small document store for a single developer.
    pub fn solo_dev(data_dir: &Path) -> Self {
        DatabaseConfig::document(
            DocumentConfig::new(data_dir.join(DOCUMENT_FILE_NAME))
                .with_max_entries(SOLO_DEV_MAX_ENTRIES),
        )
    }

    /// Native relational store.
    pub fn production(data_dir: &Path) -> Self {
        DatabaseConfig::relational(RelationalConfig::new(data_dir.join(RELATIONAL_FILE_NAME)))
    }

    /// Relational primary mirrored into a shareable document file.
    pub fn team(data_dir: &Path) -> Self {
        DatabaseConfig::hybrid(
            DocumentConfig::new(data_dir.join(DOCUMENT_FILE_NAME)),
            RelationalConfig::new(data_dir.join(RELATIONAL_FILE_NAME)),
            HybridConfig {
                primary: BackendKind::Relational,
                secondary: BackendKind::Document,
                mirror_writes: true,
            },
        )
    }
}
