//! Pluggable persistence for project context and agent profiles.
//!
//! Every backend implements one contract, [`DatabaseAdapter`], and must
//! agree on query semantics:
//!
//! - [`DocumentAdapter`]: the whole dataset in memory, committed to a single
//!   JSON file with debounced, atomic writes.
//! - [`RelationalAdapter`]: SQLite, either opened natively (WAL) or run in
//!   memory and re-serialized to its file after every mutation.
//! - [`HybridAdapter`]: a primary backend with writes mirrored to a secondary.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  ContextDatabase (facade)                                        │
//! │  - initialize() once, then every operation                       │
//! │  - capability checks for export/import, vectors, sync            │
//! │  - LegacyMigrator for the one-time upgrade                       │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │ Box<dyn DatabaseAdapter>
//!          ┌─────────────────────┼──────────────────────┐
//!   DocumentAdapter      RelationalAdapter         HybridAdapter
//!   context-db.json      context.db (SQLite)       primary + mirror
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use ctxvault_config::DatabaseConfig;
//! use ctxvault_storage::ContextDatabase;
//! use ctxvault_types::{ContextType, NewContext};
//!
//! # async fn run() -> ctxvault_storage::Result<()> {
//! let db = ContextDatabase::new(DatabaseConfig::from_env()?)?;
//! db.initialize().await?;
//! db.add_context(NewContext::new("/repo", ContextType::Note, "Remember Z"))
//!     .await?;
//! println!("{:?}", db.get_stats(None).await?);
//! db.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod database;
pub mod document;
pub mod error;
pub mod factory;
pub mod hybrid;
pub mod migration;
pub mod persist;
pub mod relational;

pub use adapter::{DatabaseAdapter, import_snapshot, sync_into};
pub use database::{ContextDatabase, PopulateReport};
pub use document::{DocumentAdapter, PendingWrite};
pub use error::{Result, StorageError};
pub use factory::{adapter_from_env, build_adapter, create_adapter, validate_config};
pub use hybrid::HybridAdapter;
pub use migration::{
    AgentValidationReport, IncompleteAgent, LegacyMigrator, MigrationOutcome, MigrationReport,
    MigrationState, validate_agents,
};
pub use relational::{RelationalAdapter, RelationalMode};
