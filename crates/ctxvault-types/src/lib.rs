//! Shared entity types for the ctxvault context store.
//!
//! These are plain value types with no storage behaviour. Every backend in
//! `ctxvault-storage` reads and writes exactly these shapes, and the JSON
//! document backend serializes them verbatim, so field names follow the
//! camelCase on-disk layout (`projectPath`, `isCustom`, `type`).

pub mod agent;
pub mod capability;
pub mod context;
pub mod error;
pub mod search;
pub mod snapshot;

pub use agent::{
    AgentPatch, CANONICAL_AGENT_NAMES, DatabaseAgent, NewAgent, STANDARD_AGENT_IDS, seed_agents,
    standard_agents,
};
pub use capability::{BackendKind, Capabilities, Capability};
pub use context::{
    ContextEntry, ContextPatch, ContextType, GLOBAL_PROJECT, MAX_IMPORTANCE, MIN_IMPORTANCE,
    NewContext, sort_newest_first, validate_importance, welcome_context,
};
pub use error::{Result, ValidationError};
pub use search::{DatabaseStats, SearchOptions, StatsFilter};
pub use snapshot::{DataSnapshot, ImportReport, SNAPSHOT_VERSION, SimilarityMatch, SyncReport};

use chrono::{DateTime, SubsecRound, Utc};

/// Opaque identifier for stored records.
pub type Id = String;

/// UTC timestamp used for every stored record.
pub type Timestamp = DateTime<Utc>;

/// Generate a fresh record id.
pub fn new_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

/// Current time, truncated to microseconds so every backend stores it losslessly.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}
