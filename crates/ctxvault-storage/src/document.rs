//! JSON document store.
//!
//! The whole dataset lives in memory and is serialized to one file:
//!
//! ```json
//! { "contexts": [...], "agents": [...], "metadata": { "version": 1, "lastUpdated": "..." } }
//! ```
//!
//! Mutations update the working set synchronously, append a [`PendingWrite`]
//! to the write-ahead buffer and re-arm a single-shot flush timer. When the
//! timer fires the buffer is drained into one atomic commit (`<file>.tmp`,
//! fsync, rename). `flush()` and `disconnect()` drain synchronously.
//!
//! A missing or zero-byte file bootstraps a fresh store with the seed agents
//! and a welcome entry. An unparseable file is moved aside to
//! `<file>.corrupt-<timestamp>` before bootstrapping.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ctxvault_config::DocumentConfig;
use ctxvault_types::{
    AgentPatch, BackendKind, Capabilities, ContextEntry, ContextPatch, DataSnapshot,
    DatabaseAgent, DatabaseStats, Id, ImportReport, NewAgent, NewContext, SearchOptions,
    StatsFilter, SyncReport, Timestamp, new_id, now, seed_agents, sort_newest_first,
    validate_importance, welcome_context,
};

use crate::adapter::{DatabaseAdapter, import_snapshot, sync_into};
use crate::error::{Result, StorageError};
use crate::persist;

/// Format version written into the file metadata.
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// On-disk layout
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    version: u32,
    last_updated: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_sync: Option<Timestamp>,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            version: DOCUMENT_FORMAT_VERSION,
            last_updated: now(),
            last_sync: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentFile {
    #[serde(default)]
    contexts: Vec<ContextEntry>,
    #[serde(default)]
    agents: Vec<DatabaseAgent>,
    #[serde(default)]
    metadata: FileMetadata,
}

#[derive(Serialize)]
struct DocumentFileRef<'a> {
    contexts: &'a [ContextEntry],
    agents: &'a [DatabaseAgent],
    metadata: FileMetadata,
}

// ─────────────────────────────────────────────────────────────────────────────
// Write-ahead buffer
// ─────────────────────────────────────────────────────────────────────────────

/// A mutation applied in memory but not yet committed to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    Insert { entity: &'static str, id: Id },
    Update { entity: &'static str, id: Id },
    Delete { entity: &'static str, id: Id },
    Bootstrap,
    SyncMarker,
}

#[derive(Default)]
struct DocumentState {
    connected: bool,
    contexts: Vec<ContextEntry>,
    agents: Vec<DatabaseAgent>,
    last_sync: Option<Timestamp>,
    pending: Vec<PendingWrite>,
    deferred_error: Option<StorageError>,
}

impl DocumentState {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(StorageError::Connection(
                "document store is not connected".to_string(),
            ))
        }
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let file = DocumentFileRef {
            contexts: &self.contexts,
            agents: &self.agents,
            metadata: FileMetadata {
                version: DOCUMENT_FORMAT_VERSION,
                last_updated: now(),
                last_sync: self.last_sync,
            },
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    fn agent_name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        self.agents
            .iter()
            .any(|a| a.name == name && Some(a.id.as_str()) != except_id)
    }
}

struct Inner {
    config: DocumentConfig,
    state: Mutex<DocumentState>,
    /// Bumped on every re-arm; a timer commits only if its generation is still current.
    timer_generation: AtomicU64,
    /// Serializes commits so an older snapshot never lands after a newer one.
    commit_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    /// Drain the buffer into one atomic write. No-op when nothing is pending.
    async fn commit(&self) -> Result<()> {
        let _commit = self.commit_lock.lock().await;

        let (bytes, drained) = {
            let state = self.state.lock();
            if state.pending.is_empty() {
                return Ok(());
            }
            (state.serialize()?, state.pending.len())
        };

        persist::atomic_write(&self.config.path, &bytes).await?;

        let mut state = self.state.lock();
        let drained = drained.min(state.pending.len());
        state.pending.drain(..drained);
        debug!(
            writes = drained,
            bytes = bytes.len(),
            path = %self.config.path.display(),
            "Committed document store"
        );
        Ok(())
    }

    fn schedule_flush(self: &Arc<Self>) {
        let delay = Duration::from_millis(self.config.flush_debounce_ms);
        let generation = self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.timer_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(e) = inner.commit().await {
                warn!(
                    error = %e,
                    path = %inner.config.path.display(),
                    "Debounced flush failed; pending writes kept for the next flush"
                );
                inner.state.lock().deferred_error = Some(e);
            }
        });
    }

    /// Disarm sleeping timers. A commit already under way runs to completion.
    fn cancel_timer(&self) {
        self.timer_generation.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// File-backed document adapter.
#[derive(Clone)]
pub struct DocumentAdapter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DocumentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAdapter")
            .field("path", &self.inner.config.path)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl DocumentAdapter {
    pub fn new(config: DocumentConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(DocumentState::default()),
                timer_generation: AtomicU64::new(0),
                commit_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    /// Mutations applied in memory but not yet on disk.
    pub fn pending_writes(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Apply `f` to the connected state, record `write`, and arm the flush timer.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut DocumentState) -> Result<(T, Option<PendingWrite>)>,
    ) -> Result<T> {
        let value = {
            let mut state = self.inner.state.lock();
            state.ensure_connected()?;
            let (value, write) = f(&mut state)?;
            match write {
                Some(write) => {
                    debug!(?write, "Document store mutation");
                    state.pending.push(write);
                }
                None => return Ok(value),
            }
            value
        };
        self.inner.schedule_flush();
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&DocumentState) -> T) -> Result<T> {
        let state = self.inner.state.lock();
        state.ensure_connected()?;
        Ok(f(&state))
    }

    async fn bootstrap(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            state.agents = seed_agents();
            state.contexts = vec![ContextEntry::from_new(new_id(), now(), welcome_context())];
            state.last_sync = None;
            state.pending.push(PendingWrite::Bootstrap);
            state.connected = true;
        }

        if let Err(e) = self.inner.commit().await {
            let mut state = self.inner.state.lock();
            *state = DocumentState::default();
            return Err(StorageError::Connection(format!(
                "failed to write initial store to {}: {e}",
                self.inner.config.path.display()
            )));
        }

        info!(path = %self.inner.config.path.display(), "Bootstrapped new document store");
        Ok(())
    }
}

/// Read the store file. `None` means bootstrap.
async fn load_document(path: &Path) -> Result<Option<DocumentFile>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No document store found");
            return Ok(None);
        }
        Err(e) => {
            return Err(StorageError::Connection(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        info!(path = %path.display(), "Document store is empty");
        return Ok(None);
    }

    match serde_json::from_slice::<DocumentFile>(&bytes) {
        Ok(file) => Ok(Some(file)),
        Err(parse_error) => {
            let suffix = format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f"));
            let quarantine = persist::sibling_with_suffix(path, &suffix);
            tokio::fs::rename(path, &quarantine).await.map_err(|e| {
                StorageError::Connection(format!(
                    "cannot move unreadable store {} aside: {e}",
                    path.display()
                ))
            })?;
            warn!(
                path = %path.display(),
                quarantine = %quarantine.display(),
                error = %parse_error,
                "Document store is unreadable; moved it aside and starting fresh"
            );
            Ok(None)
        }
    }
}

#[async_trait]
impl DatabaseAdapter for DocumentAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            export_import: true,
            vector_search: false,
            sync: true,
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let path = self.inner.config.path.clone();
        persist::ensure_parent_dir(&path).await.map_err(|e| {
            StorageError::Connection(format!("cannot create directory for {}: {e}", path.display()))
        })?;

        match load_document(&path).await? {
            Some(file) => {
                let mut state = self.inner.state.lock();
                info!(
                    path = %path.display(),
                    contexts = file.contexts.len(),
                    agents = file.agents.len(),
                    version = file.metadata.version,
                    "Document store loaded"
                );
                state.contexts = file.contexts;
                state.agents = file.agents;
                state.last_sync = file.metadata.last_sync;
                state.pending.clear();
                state.deferred_error = None;
                state.connected = true;
                Ok(())
            }
            None => self.bootstrap().await,
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.flush().await?;
        *self.inner.state.lock() = DocumentState::default();
        info!(path = %self.inner.config.path.display(), "Document store closed");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.inner.cancel_timer();
        let result = self.inner.commit().await;
        let deferred = self.inner.state.lock().deferred_error.take();
        match (result, deferred) {
            (Err(e), _) => Err(e),
            (Ok(()), Some(earlier)) => Err(earlier),
            (Ok(()), None) => Ok(()),
        }
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    async fn insert_context(&self, context: NewContext) -> Result<Id> {
        context.validate()?;
        let max_entries = self.inner.config.max_entries;
        self.mutate(|state| {
            if state.contexts.len() >= max_entries {
                warn!(
                    count = state.contexts.len() + 1,
                    max_entries, "Document store is over its soft capacity"
                );
            }
            let entry = ContextEntry::from_new(new_id(), now(), context);
            let id = entry.id.clone();
            state.contexts.push(entry);
            Ok((
                id.clone(),
                Some(PendingWrite::Insert {
                    entity: "context",
                    id,
                }),
            ))
        })
    }

    async fn insert_context_with_id(&self, entry: ContextEntry) -> Result<()> {
        validate_importance(entry.importance)?;
        self.mutate(|state| {
            if state.contexts.iter().any(|c| c.id == entry.id) {
                return Err(StorageError::Protected {
                    entity: "context",
                    name: entry.id,
                });
            }
            let id = entry.id.clone();
            state.contexts.push(entry);
            Ok((
                (),
                Some(PendingWrite::Insert {
                    entity: "context",
                    id,
                }),
            ))
        })
    }

    async fn get_context(&self, id: &str) -> Result<Option<ContextEntry>> {
        self.read(|state| state.contexts.iter().find(|c| c.id == id).cloned())
    }

    async fn list_contexts(&self, options: &SearchOptions) -> Result<Vec<ContextEntry>> {
        let mut matched = self.read(|state| {
            state
                .contexts
                .iter()
                .filter(|c| options.matches(c))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        sort_newest_first(&mut matched);
        Ok(options.paginate(matched))
    }

    async fn update_context(&self, id: &str, patch: ContextPatch) -> Result<()> {
        patch.validate()?;
        self.mutate(|state| {
            let entry = state
                .contexts
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| StorageError::context_not_found(id))?;
            if patch.is_empty() {
                return Ok(((), None));
            }
            entry.apply(patch);
            Ok((
                (),
                Some(PendingWrite::Update {
                    entity: "context",
                    id: id.to_string(),
                }),
            ))
        })
    }

    async fn delete_context(&self, id: &str) -> Result<()> {
        self.mutate(|state| {
            let index = state
                .contexts
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| StorageError::context_not_found(id))?;
            state.contexts.remove(index);
            Ok((
                (),
                Some(PendingWrite::Delete {
                    entity: "context",
                    id: id.to_string(),
                }),
            ))
        })
    }

    // ── Agents ───────────────────────────────────────────────────────────

    async fn insert_agent(&self, agent: NewAgent) -> Result<Id> {
        agent.validate()?;
        self.mutate(|state| {
            if state.agent_name_taken(&agent.name, None) {
                return Err(StorageError::duplicate_agent_name(&agent.name));
            }
            let id = new_id();
            state.agents.push(agent.into_agent(id.clone()));
            Ok((
                id.clone(),
                Some(PendingWrite::Insert { entity: "agent", id }),
            ))
        })
    }

    async fn insert_agent_with_id(&self, agent: DatabaseAgent) -> Result<()> {
        let missing = agent.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::InvalidData(format!(
                "agent is missing required fields: {}",
                missing.join(", ")
            )));
        }
        self.mutate(|state| {
            if let Some(existing) = state.agents.iter().find(|a| a.id == agent.id) {
                return Err(StorageError::Protected {
                    entity: "agent",
                    name: existing.name.clone(),
                });
            }
            if state.agent_name_taken(&agent.name, None) {
                return Err(StorageError::duplicate_agent_name(&agent.name));
            }
            let id = agent.id.clone();
            state.agents.push(agent);
            Ok(((), Some(PendingWrite::Insert { entity: "agent", id })))
        })
    }

    async fn get_agent(&self, id: &str) -> Result<Option<DatabaseAgent>> {
        self.read(|state| state.agents.iter().find(|a| a.id == id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<DatabaseAgent>> {
        let mut agents = self.read(|state| state.agents.clone())?;
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }

    async fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<()> {
        patch.validate()?;
        self.mutate(|state| {
            if let Some(name) = &patch.name {
                if state.agent_name_taken(name, Some(id)) {
                    return Err(StorageError::duplicate_agent_name(name));
                }
            }
            let agent = state
                .agents
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| StorageError::agent_not_found(id))?;
            if patch.is_empty() {
                return Ok(((), None));
            }
            agent.apply(patch);
            Ok((
                (),
                Some(PendingWrite::Update {
                    entity: "agent",
                    id: id.to_string(),
                }),
            ))
        })
    }

    async fn delete_agent(&self, id: &str) -> Result<()> {
        self.mutate(|state| {
            let index = state
                .agents
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| StorageError::agent_not_found(id))?;
            if !state.agents[index].is_custom {
                return Err(StorageError::Protected {
                    entity: "agent",
                    name: state.agents[index].name.clone(),
                });
            }
            state.agents.remove(index);
            Ok((
                (),
                Some(PendingWrite::Delete {
                    entity: "agent",
                    id: id.to_string(),
                }),
            ))
        })
    }

    async fn replace_agent(&self, old_id: &str, agent: DatabaseAgent) -> Result<()> {
        let missing = agent.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::InvalidData(format!(
                "agent is missing required fields: {}",
                missing.join(", ")
            )));
        }
        self.mutate(|state| {
            let index = state
                .agents
                .iter()
                .position(|a| a.id == old_id)
                .ok_or_else(|| StorageError::agent_not_found(old_id))?;
            if agent.id != old_id {
                if let Some(existing) = state.agents.iter().find(|a| a.id == agent.id) {
                    return Err(StorageError::Protected {
                        entity: "agent",
                        name: existing.name.clone(),
                    });
                }
            }
            if state.agent_name_taken(&agent.name, Some(old_id)) {
                return Err(StorageError::duplicate_agent_name(&agent.name));
            }
            let id = agent.id.clone();
            state.agents[index] = agent;
            Ok(((), Some(PendingWrite::Update { entity: "agent", id })))
        })
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    async fn stats(&self, filter: Option<&StatsFilter>) -> Result<DatabaseStats> {
        let mut stats = self.read(|state| {
            let mut stats = DatabaseStats::tally(
                BackendKind::Document,
                state
                    .contexts
                    .iter()
                    .filter(|c| filter.is_none_or(|f| f.matches(c))),
                state.agents.len(),
            );
            stats.last_sync = state.last_sync;
            stats
        })?;
        stats.storage_size_bytes = tokio::fs::metadata(&self.inner.config.path)
            .await
            .ok()
            .map(|m| m.len());
        Ok(stats)
    }

    // ── Optional capabilities ────────────────────────────────────────────

    async fn export_data(&self) -> Result<DataSnapshot> {
        let (mut contexts, agents) =
            self.read(|state| (state.contexts.clone(), state.agents.clone()))?;
        sort_newest_first(&mut contexts);
        Ok(DataSnapshot::new(contexts, agents))
    }

    async fn import_data(&self, snapshot: DataSnapshot) -> Result<ImportReport> {
        let report = import_snapshot(self, snapshot).await?;
        info!(
            contexts = report.contexts_imported,
            agents = report.agents_imported,
            skipped = report.skipped,
            "Imported snapshot into document store"
        );
        Ok(report)
    }

    async fn sync_with(&self, target: &dyn DatabaseAdapter) -> Result<SyncReport> {
        let report = sync_into(self, target).await?;
        self.mutate(|state| {
            state.last_sync = Some(now());
            Ok(((), Some(PendingWrite::SyncMarker)))
        })?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxvault_types::{CANONICAL_AGENT_NAMES, ContextType};
    use tempfile::TempDir;

    fn config(dir: &TempDir, debounce_ms: u64) -> DocumentConfig {
        DocumentConfig::new(dir.path().join("store").join("context-db.json"))
            .with_flush_debounce_ms(debounce_ms)
    }

    fn on_disk(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_on_absent_file() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 10));
        adapter.connect().await.unwrap();

        let agents = adapter.list_agents().await.unwrap();
        assert_eq!(agents.len(), 3);
        assert!(agents.iter().all(|a| !a.is_custom));
        for name in CANONICAL_AGENT_NAMES {
            assert!(agents.iter().any(|a| a.name == name));
        }

        let contexts = adapter.list_contexts(&SearchOptions::new()).await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].importance, 9);

        // Written immediately, not on the debounce timer.
        let file = on_disk(adapter.path());
        assert_eq!(file["contexts"].as_array().unwrap().len(), 1);
        assert_eq!(file["metadata"]["version"], 1);
        assert!(file["metadata"]["lastUpdated"].is_string());
    }

    #[tokio::test]
    async fn test_bootstrap_on_zero_byte_file() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 10);
        std::fs::create_dir_all(config.path.parent().unwrap()).unwrap();
        std::fs::write(&config.path, b"").unwrap();

        let adapter = DocumentAdapter::new(config);
        adapter.connect().await.unwrap();
        assert_eq!(adapter.list_agents().await.unwrap().len(), 3);
        assert_eq!(adapter.stats(None).await.unwrap().total_contexts, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 10);
        let parent = config.path.parent().unwrap().to_path_buf();
        std::fs::create_dir_all(&parent).unwrap();
        std::fs::write(&config.path, b"{ not json").unwrap();

        let adapter = DocumentAdapter::new(config);
        adapter.connect().await.unwrap();
        assert_eq!(adapter.list_agents().await.unwrap().len(), 3);

        let quarantined: Vec<_> = std::fs::read_dir(&parent)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(std::fs::read(quarantined[0].path()).unwrap(), b"{ not json");
    }

    #[tokio::test]
    async fn test_writes_are_debounced_until_flush() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 60_000));
        adapter.connect().await.unwrap();

        let id = adapter
            .insert_context(NewContext::new("/p", ContextType::Decision, "Use X"))
            .await
            .unwrap();

        // Visible in memory at once, not yet on disk.
        assert!(adapter.get_context(&id).await.unwrap().is_some());
        assert_eq!(adapter.pending_writes(), 1);
        assert_eq!(
            on_disk(adapter.path())["contexts"].as_array().unwrap().len(),
            1
        );

        adapter.flush().await.unwrap();
        assert_eq!(adapter.pending_writes(), 0);
        assert_eq!(
            on_disk(adapter.path())["contexts"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_timer_commits_batch() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 20));
        adapter.connect().await.unwrap();

        for i in 0..5 {
            adapter
                .insert_context(NewContext::new("/p", ContextType::Note, format!("n{i}")))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(adapter.pending_writes(), 0);
        assert_eq!(
            on_disk(adapter.path())["contexts"].as_array().unwrap().len(),
            6
        );
        assert!(!persist::temp_sibling(adapter.path()).exists());
    }

    #[tokio::test]
    async fn test_rearm_supersedes_sleeping_timer() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 200));
        adapter.connect().await.unwrap();

        adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "first"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "second"))
            .await
            .unwrap();

        // The first timer has woken, but the re-arm made it stale.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(adapter.pending_writes(), 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(adapter.pending_writes(), 0);
        assert_eq!(
            on_disk(adapter.path())["contexts"].as_array().unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_burst_with_commits_in_flight_keeps_every_write() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 1));
        adapter.connect().await.unwrap();

        for i in 0..40 {
            adapter
                .insert_context(NewContext::new("/p", ContextType::Note, format!("n{i}")))
                .await
                .unwrap();
            if i % 4 == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
        adapter.flush().await.unwrap();

        assert_eq!(adapter.pending_writes(), 0);
        assert_eq!(
            on_disk(adapter.path())["contexts"].as_array().unwrap().len(),
            41
        );
        assert!(!persist::temp_sibling(adapter.path()).exists());
    }

    #[tokio::test]
    async fn test_disconnect_flushes_and_reload_sees_data() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 60_000));
        adapter.connect().await.unwrap();
        let id = adapter
            .insert_context(
                NewContext::new("/p", ContextType::Code, "parser notes").with_tag("parser"),
            )
            .await
            .unwrap();
        adapter.disconnect().await.unwrap();
        assert!(!adapter.is_connected());

        let reopened = DocumentAdapter::new(config(&dir, 60_000));
        reopened.connect().await.unwrap();
        let entry = reopened.get_context(&id).await.unwrap().unwrap();
        assert_eq!(entry.tags, vec!["parser".to_string()]);
        assert_eq!(reopened.list_agents().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_background_failure_is_reraised() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 10);
        let parent = config.path.parent().unwrap().to_path_buf();
        let adapter = DocumentAdapter::new(config);
        adapter.connect().await.unwrap();

        // Replace the store directory with a plain file so commits fail.
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, b"").unwrap();

        adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "lost?"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(adapter.pending_writes(), 1);
        assert!(adapter.disconnect().await.is_err());
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn test_agent_rules() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 10));
        adapter.connect().await.unwrap();

        let seed = adapter.list_agents().await.unwrap().remove(0);
        assert!(matches!(
            adapter.delete_agent(&seed.id).await,
            Err(StorageError::Protected { .. })
        ));
        assert!(matches!(
            adapter
                .insert_agent(NewAgent::custom(seed.name.clone(), "dup"))
                .await,
            Err(StorageError::Conflict(_))
        ));
        assert!(matches!(
            adapter.insert_agent_with_id(seed.clone()).await,
            Err(StorageError::Protected { .. })
        ));

        let id = adapter
            .insert_agent(NewAgent::custom("Docs", "Writes documentation"))
            .await
            .unwrap();
        adapter
            .update_agent(
                &id,
                AgentPatch {
                    enabled: Some(false),
                    ..AgentPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(!adapter.get_agent(&id).await.unwrap().unwrap().enabled);

        adapter.delete_agent(&id).await.unwrap();
        assert!(adapter.get_agent(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contract_violations() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 10));

        assert!(matches!(
            adapter.get_context("x").await,
            Err(StorageError::Connection(_))
        ));

        adapter.connect().await.unwrap();
        assert!(matches!(
            adapter
                .insert_context(
                    NewContext::new("/p", ContextType::Note, "x").with_importance(11)
                )
                .await,
            Err(StorageError::InvalidData(_))
        ));
        assert!(matches!(
            adapter.delete_context("missing").await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            adapter
                .update_context("missing", ContextPatch::default())
                .await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_soft_capacity_only_warns() {
        let dir = TempDir::new().unwrap();
        let adapter = DocumentAdapter::new(config(&dir, 10).with_max_entries(1));
        adapter.connect().await.unwrap();

        adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "over"))
            .await
            .unwrap();
        assert_eq!(adapter.stats(None).await.unwrap().total_contexts, 2);
    }
}
