//! The storage contract every backend implements.
//!
//! Required operations cover connection lifecycle, context and agent CRUD,
//! search and aggregate statistics. Export/import, vector search and
//! cross-adapter sync are optional: a backend advertises them through
//! [`DatabaseAdapter::capabilities`], and the default bodies report
//! [`StorageError::Unsupported`].
//!
//! # Example
//!
//! ```ignore
//! async fn newest_decisions(db: &dyn DatabaseAdapter) -> Result<Vec<ContextEntry>> {
//!     let options = SearchOptions::new().with_type(ContextType::Decision).paged(10, 0);
//!     db.list_contexts(&options).await
//! }
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use ctxvault_types::{
    AgentPatch, BackendKind, Capabilities, Capability, ContextEntry, ContextPatch, DataSnapshot,
    DatabaseAgent, DatabaseStats, Id, ImportReport, NewAgent, NewContext, SearchOptions,
    SimilarityMatch, StatsFilter, SyncReport,
};

use crate::error::{Result, StorageError};

/// A concrete backend behind the storage contract.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the facade shares one instance for
/// the lifetime of the process.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// The backend kind, reported in stats and errors.
    fn kind(&self) -> BackendKind;

    /// Optional operations this backend provides.
    fn capabilities(&self) -> Capabilities;

    fn is_connected(&self) -> bool;

    /// Open the backing resource. Calling it on a connected adapter is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Release the backing resource after making every mutation durable.
    async fn disconnect(&self) -> Result<()>;

    /// Connected, and statistics can be computed.
    async fn health_check(&self) -> bool {
        self.is_connected() && self.stats(None).await.is_ok()
    }

    /// Force pending writes to durable storage.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    /// Store a new entry. The adapter assigns id and timestamp.
    async fn insert_context(&self, context: NewContext) -> Result<Id>;

    /// Store an entry with caller-supplied identity. Used by bootstrap and migration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Protected`] if the id already exists.
    async fn insert_context_with_id(&self, entry: ContextEntry) -> Result<()>;

    /// Returns `Ok(None)` if the entry does not exist.
    async fn get_context(&self, id: &str) -> Result<Option<ContextEntry>>;

    /// Filtered entries, newest first, paginated last.
    async fn list_contexts(&self, options: &SearchOptions) -> Result<Vec<ContextEntry>>;

    /// Like [`list_contexts`](Self::list_contexts) with `query` as the free-text filter.
    async fn search_contexts(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ContextEntry>> {
        let options = SearchOptions {
            query: Some(query.to_string()),
            ..options.clone()
        };
        self.list_contexts(&options).await
    }

    async fn update_context(&self, id: &str, patch: ContextPatch) -> Result<()>;

    async fn delete_context(&self, id: &str) -> Result<()>;

    // ── Agents ───────────────────────────────────────────────────────────

    async fn insert_agent(&self, agent: NewAgent) -> Result<Id>;

    /// Store an agent with a predefined id.
    ///
    /// # Errors
    ///
    /// [`StorageError::Protected`] if the id exists, [`StorageError::Conflict`]
    /// if the name is taken.
    async fn insert_agent_with_id(&self, agent: DatabaseAgent) -> Result<()>;

    async fn get_agent(&self, id: &str) -> Result<Option<DatabaseAgent>>;

    /// Every agent, ordered by name.
    async fn list_agents(&self) -> Result<Vec<DatabaseAgent>>;

    async fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<()>;

    /// # Errors
    ///
    /// [`StorageError::Protected`] for seed agents (`is_custom == false`).
    async fn delete_agent(&self, id: &str) -> Result<()>;

    /// Store `agent` in place of the agent held under `old_id`, id included.
    ///
    /// Aligns mirrored catalogues whose seed agents were created with
    /// independent ids.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if `old_id` is absent, [`StorageError::Protected`]
    /// if the new id belongs to another agent, [`StorageError::Conflict`] if the
    /// name does.
    async fn replace_agent(&self, old_id: &str, agent: DatabaseAgent) -> Result<()>;

    // ── Aggregates ───────────────────────────────────────────────────────

    async fn stats(&self, filter: Option<&StatsFilter>) -> Result<DatabaseStats>;

    // ── Optional capabilities ────────────────────────────────────────────

    async fn export_data(&self) -> Result<DataSnapshot> {
        Err(StorageError::unsupported(
            Capability::ExportImport,
            self.kind(),
        ))
    }

    async fn import_data(&self, snapshot: DataSnapshot) -> Result<ImportReport> {
        let _ = snapshot;
        Err(StorageError::unsupported(
            Capability::ExportImport,
            self.kind(),
        ))
    }

    async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SimilarityMatch>> {
        let _ = (embedding, limit);
        Err(StorageError::unsupported(
            Capability::VectorSearch,
            self.kind(),
        ))
    }

    async fn store_embedding(&self, context_id: &str, embedding: &[f32]) -> Result<()> {
        let _ = (context_id, embedding);
        Err(StorageError::unsupported(
            Capability::VectorSearch,
            self.kind(),
        ))
    }

    /// Copy every record missing from `target` into it, preserving identity.
    async fn sync_with(&self, target: &dyn DatabaseAdapter) -> Result<SyncReport> {
        let _ = target;
        Err(StorageError::unsupported(Capability::Sync, self.kind()))
    }
}

/// Copy records present in `source` but absent from `target`.
///
/// Records are matched by id. Agents whose name is already taken in the
/// target are skipped; other per-record failures are counted and logged and
/// the rest of the batch continues.
pub async fn sync_into(
    source: &dyn DatabaseAdapter,
    target: &dyn DatabaseAdapter,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for agent in source.list_agents().await? {
        if target.get_agent(&agent.id).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        let id = agent.id.clone();
        match target.insert_agent_with_id(agent).await {
            Ok(()) => report.agents_copied += 1,
            Err(StorageError::Conflict(reason)) => {
                debug!(agent_id = %id, %reason, "Skipping synced agent");
                report.skipped += 1;
            }
            Err(e) => {
                warn!(agent_id = %id, error = %e, "Failed to sync agent");
                report.failed += 1;
            }
        }
    }

    for entry in source.list_contexts(&SearchOptions::default()).await? {
        if target.get_context(&entry.id).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        let id = entry.id.clone();
        match target.insert_context_with_id(entry).await {
            Ok(()) => report.contexts_copied += 1,
            Err(e) => {
                warn!(context_id = %id, error = %e, "Failed to sync context");
                report.failed += 1;
            }
        }
    }

    debug!(
        source = %source.kind(),
        target = %target.kind(),
        contexts = report.contexts_copied,
        agents = report.agents_copied,
        skipped = report.skipped,
        failed = report.failed,
        "Sync complete"
    );
    Ok(report)
}

/// Import a snapshot through the identity-preserving inserts.
///
/// Records whose id exists, and agents whose name is taken, are skipped.
pub async fn import_snapshot(
    target: &dyn DatabaseAdapter,
    snapshot: DataSnapshot,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for agent in snapshot.agents {
        if target.get_agent(&agent.id).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        match target.insert_agent_with_id(agent).await {
            Ok(()) => report.agents_imported += 1,
            Err(StorageError::Conflict(reason)) => {
                debug!(%reason, "Skipping imported agent");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for entry in snapshot.contexts {
        if target.get_context(&entry.id).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        target.insert_context_with_id(entry).await?;
        report.contexts_imported += 1;
    }

    Ok(report)
}
