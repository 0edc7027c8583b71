//! Full-dataset export/import and cross-backend sync results.

use serde::{Deserialize, Serialize};

use crate::agent::DatabaseAgent;
use crate::context::ContextEntry;
use crate::{Id, Timestamp};

/// Format version written into every exported snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A complete copy of a store's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    pub version: u32,
    pub exported_at: Timestamp,
    pub contexts: Vec<ContextEntry>,
    pub agents: Vec<DatabaseAgent>,
}

impl DataSnapshot {
    pub fn new(contexts: Vec<ContextEntry>, agents: Vec<DatabaseAgent>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at: crate::now(),
            contexts,
            agents,
        }
    }
}

/// Outcome of importing a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub contexts_imported: usize,
    pub agents_imported: usize,
    /// Records already present (by id, or agents by name) and left alone.
    pub skipped: usize,
}

/// Outcome of pushing one backend's records into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub contexts_copied: usize,
    pub agents_copied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One hit from a vector similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityMatch {
    pub context_id: Id,
    /// Cosine similarity in [-1, 1]; higher is closer.
    pub score: f32,
}
