//! The persistence facade callers hold for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use ctxvault_config::DatabaseConfig;
use ctxvault_types::{
    AgentPatch, BackendKind, Capabilities, Capability, ContextEntry, ContextPatch, DataSnapshot,
    DatabaseAgent, DatabaseStats, Id, ImportReport, NewAgent, NewContext, SearchOptions,
    SimilarityMatch, StatsFilter, SyncReport, standard_agents,
};

use crate::adapter::DatabaseAdapter;
use crate::error::{Result, StorageError};
use crate::factory::{build_adapter, validate_config};
use crate::migration::{AgentValidationReport, LegacyMigrator, MigrationOutcome, validate_agents};
use crate::persist::ensure_parent_dir;

/// Outcome of [`ContextDatabase::populate_standard_agents`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulateReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Owns one adapter and gates every operation on successful initialization.
///
/// # Example
///
/// ```no_run
/// use ctxvault_storage::ContextDatabase;
/// use ctxvault_types::{ContextType, NewContext, SearchOptions};
///
/// # async fn run() -> ctxvault_storage::Result<()> {
/// let db = ContextDatabase::for_solo_dev(std::path::Path::new("/tmp/ctxvault"))?;
/// db.initialize().await?;
///
/// let id = db
///     .add_context(NewContext::new("/repo", ContextType::Decision, "Use X").with_importance(9))
///     .await?;
/// let hits = db
///     .search_contexts("use", &SearchOptions::new().with_type(ContextType::Decision))
///     .await?;
/// assert_eq!(hits[0].id, id);
///
/// db.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ContextDatabase {
    adapter: Box<dyn DatabaseAdapter>,
    storage_paths: Vec<PathBuf>,
    initialized: OnceCell<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ContextDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextDatabase")
            .field("backend", &self.adapter.kind())
            .field("storage_paths", &self.storage_paths)
            .field("initialized", &self.initialized.initialized())
            .finish()
    }
}

impl ContextDatabase {
    /// Validate `config` and build its adapter. Nothing is opened yet.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let spec = validate_config(&config)?;
        let storage_paths = spec.storage_paths();
        Ok(Self {
            adapter: build_adapter(spec),
            storage_paths,
            initialized: OnceCell::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Wrap an adapter built elsewhere. No directories are prepared on initialize.
    pub fn with_adapter(adapter: Box<dyn DatabaseAdapter>) -> Self {
        Self {
            adapter,
            storage_paths: Vec::new(),
            initialized: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::new(DatabaseConfig::from_env()?)
    }

    pub fn for_solo_dev(data_dir: &Path) -> Result<Self> {
        Self::new(DatabaseConfig::solo_dev(data_dir))
    }

    pub fn for_production(data_dir: &Path) -> Result<Self> {
        Self::new(DatabaseConfig::production(data_dir))
    }

    pub fn for_team(data_dir: &Path) -> Result<Self> {
        Self::new(DatabaseConfig::team(data_dir))
    }

    pub fn kind(&self) -> BackendKind {
        self.adapter.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    /// Files the configured backend stores its data in.
    pub fn storage_paths(&self) -> &[PathBuf] {
        &self.storage_paths
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized() && !self.closed.load(Ordering::SeqCst)
    }

    /// Prepare storage directories and connect. Later calls are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Connection(
                "database has been shut down".to_string(),
            ));
        }
        self.initialized
            .get_or_try_init(|| async {
                for path in &self.storage_paths {
                    ensure_parent_dir(path).await.map_err(|e| {
                        StorageError::Connection(format!(
                            "cannot create directory for {}: {e}",
                            path.display()
                        ))
                    })?;
                }
                self.adapter.connect().await?;
                info!(backend = %self.adapter.kind(), "Context database initialized");
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    fn adapter(&self) -> Result<&dyn DatabaseAdapter> {
        if !self.initialized.initialized() {
            return Err(StorageError::NotInitialized);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Connection(
                "database has been shut down".to_string(),
            ));
        }
        Ok(self.adapter.as_ref())
    }

    fn require(&self, capability: Capability) -> Result<&dyn DatabaseAdapter> {
        let adapter = self.adapter()?;
        if !adapter.capabilities().supports(capability) {
            return Err(StorageError::Unsupported {
                capability,
                backend: adapter.kind(),
            });
        }
        Ok(adapter)
    }

    /// Flush and disconnect. The facade cannot be reused afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        let adapter = self.adapter()?;
        adapter.disconnect().await?;
        self.closed.store(true, Ordering::SeqCst);
        info!(backend = %adapter.kind(), "Context database shut down");
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        match self.adapter() {
            Ok(adapter) => adapter.health_check().await,
            Err(_) => false,
        }
    }

    pub async fn flush(&self) -> Result<()> {
        self.adapter()?.flush().await
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    pub async fn add_context(&self, context: NewContext) -> Result<Id> {
        self.adapter()?.insert_context(context).await
    }

    /// Every entry, or only those of `project_path`, newest first.
    pub async fn get_contexts(&self, project_path: Option<&str>) -> Result<Vec<ContextEntry>> {
        let options = match project_path {
            Some(project) => SearchOptions::for_project(project),
            None => SearchOptions::default(),
        };
        self.adapter()?.list_contexts(&options).await
    }

    pub async fn list_contexts(&self, options: &SearchOptions) -> Result<Vec<ContextEntry>> {
        self.adapter()?.list_contexts(options).await
    }

    pub async fn search_contexts(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ContextEntry>> {
        self.adapter()?.search_contexts(query, options).await
    }

    /// `Ok(None)` when the id is unknown.
    pub async fn get_context_by_id(&self, id: &str) -> Result<Option<ContextEntry>> {
        self.adapter()?.get_context(id).await
    }

    pub async fn update_context(&self, id: &str, patch: ContextPatch) -> Result<()> {
        self.adapter()?.update_context(id, patch).await
    }

    pub async fn delete_context(&self, id: &str) -> Result<()> {
        self.adapter()?.delete_context(id).await
    }

    // ── Agents ───────────────────────────────────────────────────────────

    pub async fn get_all_agents(&self) -> Result<Vec<DatabaseAgent>> {
        self.adapter()?.list_agents().await
    }

    pub async fn get_agent_by_id(&self, id: &str) -> Result<Option<DatabaseAgent>> {
        self.adapter()?.get_agent(id).await
    }

    pub async fn add_agent(&self, agent: NewAgent) -> Result<Id> {
        self.adapter()?.insert_agent(agent).await
    }

    pub async fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<()> {
        self.adapter()?.update_agent(id, patch).await
    }

    pub async fn delete_agent(&self, id: &str) -> Result<()> {
        self.adapter()?.delete_agent(id).await
    }

    /// Insert the standard profiles under their stable ids.
    ///
    /// Profiles whose id exists are skipped. A profile whose name is already
    /// held by another id is logged and skipped as well.
    pub async fn populate_standard_agents(&self) -> Result<PopulateReport> {
        let adapter = self.adapter()?;
        let mut report = PopulateReport::default();

        for agent in standard_agents() {
            if adapter.get_agent(&agent.id).await?.is_some() {
                debug!(agent_id = %agent.id, "Standard agent already present");
                report.skipped += 1;
                continue;
            }
            let (id, name) = (agent.id.clone(), agent.name.clone());
            match adapter.insert_agent_with_id(agent).await {
                Ok(()) => report.inserted += 1,
                Err(e @ (StorageError::Conflict(_) | StorageError::Protected { .. })) => {
                    warn!(agent_id = %id, %name, error = %e, "Skipping standard agent");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "Standard agents populated"
        );
        Ok(report)
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    pub async fn get_stats(&self, filter: Option<&StatsFilter>) -> Result<DatabaseStats> {
        self.adapter()?.stats(filter).await
    }

    // ── Optional capabilities ────────────────────────────────────────────

    pub async fn export_data(&self) -> Result<DataSnapshot> {
        self.require(Capability::ExportImport)?.export_data().await
    }

    pub async fn import_data(&self, snapshot: DataSnapshot) -> Result<ImportReport> {
        self.require(Capability::ExportImport)?
            .import_data(snapshot)
            .await
    }

    pub async fn vector_search(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        self.require(Capability::VectorSearch)?
            .vector_search(embedding, limit)
            .await
    }

    pub async fn store_embedding(&self, context_id: &str, embedding: &[f32]) -> Result<()> {
        self.require(Capability::VectorSearch)?
            .store_embedding(context_id, embedding)
            .await
    }

    /// Copy every record missing from `target` into it.
    pub async fn sync_with(&self, target: &ContextDatabase) -> Result<SyncReport> {
        let source = self.require(Capability::Sync)?;
        source.sync_with(target.adapter()?).await
    }

    // ── Migration ────────────────────────────────────────────────────────

    pub async fn migrate(&self, migrator: &LegacyMigrator) -> Result<MigrationOutcome> {
        migrator.run(self.adapter()?).await
    }

    pub async fn validate_agents(&self) -> Result<AgentValidationReport> {
        validate_agents(self.adapter()?).await
    }
}
