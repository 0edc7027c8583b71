//! SQLite-backed adapters.
//!
//! Two variants share one implementation and differ only in how the
//! database reaches the disk:
//!
//! - [`RelationalMode::Native`] opens the file directly (WAL mode).
//! - [`RelationalMode::Embedded`] runs an in-memory engine, loads the file
//!   on connect and re-serializes the whole database after every mutation.
//!
//! # Schema
//!
//! ```text
//! contexts            (id, project_path, type, content, timestamp, importance, tags)
//! agents              (id, name UNIQUE, description, emoji, specializations, color,
//!                      enabled, is_custom, prompt)
//! meta                (key, value)
//! context_embeddings  (context_id -> contexts.id, dimensions, embedding)
//! ```
//!
//! Tags and specializations are JSON arrays in text columns. Timestamps are
//! RFC 3339 with microsecond precision so text order is time order.

mod agent_ops;
mod context_ops;
mod embedded;
pub mod schema;
mod vector_ops;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use ctxvault_config::RelationalConfig;
use ctxvault_types::{
    AgentPatch, BackendKind, Capabilities, Capability, ContextEntry, ContextPatch, DataSnapshot,
    DatabaseAgent, DatabaseStats, Id, ImportReport, NewAgent, NewContext, SearchOptions,
    SimilarityMatch, StatsFilter, SyncReport, Timestamp, new_id, now, validate_importance,
};

use crate::adapter::{DatabaseAdapter, import_snapshot, sync_into};
use crate::error::{Result, StorageError};
use crate::persist;

const LAST_SYNC_KEY: &str = "last_sync";

/// How the database reaches the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalMode {
    Native,
    Embedded,
}

/// SQLite adapter.
pub struct RelationalAdapter {
    config: RelationalConfig,
    mode: RelationalMode,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RelationalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalAdapter")
            .field("path", &self.config.path)
            .field("mode", &self.mode)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl RelationalAdapter {
    pub fn new(config: RelationalConfig, mode: RelationalMode) -> Self {
        Self {
            config,
            mode,
            conn: Mutex::new(None),
        }
    }

    /// Adapter that opens the database file directly.
    pub fn native(config: RelationalConfig) -> Self {
        Self::new(config, RelationalMode::Native)
    }

    /// Adapter with an in-memory engine persisted to the file after each mutation.
    pub fn embedded(config: RelationalConfig) -> Self {
        Self::new(config, RelationalMode::Embedded)
    }

    pub fn mode(&self) -> RelationalMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(not_connected)?;
        f(conn)
    }

    /// Run a mutation. The embedded variant re-serializes the database
    /// afterwards and reverts the mutation if that fails.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or_else(not_connected)?;
        if self.mode == RelationalMode::Native {
            return f(&*conn);
        }

        let before = embedded::snapshot(conn)?;
        let value = f(&*conn)?;
        if let Err(e) = embedded::persist_to_file(conn, &self.config.path) {
            warn!(path = %self.config.path.display(), error = %e, "Reverting unpersisted mutation");
            embedded::restore(conn, &before)?;
            return Err(e);
        }
        Ok(value)
    }

    fn open(&self) -> Result<Connection> {
        let path = &self.config.path;
        let conn = match self.mode {
            RelationalMode::Native => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
                )?;
                schema::apply_file_pragmas(&conn)?;
                schema::initialize(&conn)?;
                conn
            }
            RelationalMode::Embedded => {
                let conn = Connection::open_in_memory()?;
                schema::apply_memory_pragmas(&conn)?;
                schema::initialize(&conn)?;
                let has_data = std::fs::metadata(path).is_ok_and(|m| m.len() > 0);
                if has_data {
                    embedded::load_from_file(&conn, path)?;
                }
                conn
            }
        };

        let seeded = agent_ops::seed_if_empty(&conn)?;
        if self.mode == RelationalMode::Embedded {
            embedded::persist_to_file(&conn, path)?;
        } else if seeded > 0 {
            debug!("Seeded agents into {}", path.display());
        }

        if let Some(dims) = self.config.vector_dimensions {
            let mismatched = vector_ops::count_mismatched(&conn, dims)?;
            if mismatched > 0 {
                warn!(
                    configured = dims,
                    mismatched, "Stored embeddings have a different width and are ignored by search"
                );
            }
        }

        Ok(conn)
    }

    fn dimensions(&self) -> Result<usize> {
        self.config
            .vector_dimensions
            .ok_or_else(|| StorageError::unsupported(Capability::VectorSearch, self.kind()))
    }
}

fn not_connected() -> StorageError {
    StorageError::Connection("relational store is not connected".to_string())
}

/// RFC 3339 in UTC with microseconds; lexical order equals time order.
pub(crate) fn encode_timestamp(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad timestamp '{value}': {e}")))
}

#[async_trait]
impl DatabaseAdapter for RelationalAdapter {
    fn kind(&self) -> BackendKind {
        match self.mode {
            RelationalMode::Native => BackendKind::Relational,
            RelationalMode::Embedded => BackendKind::EmbeddedRelational,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            export_import: true,
            vector_search: self.config.vector_dimensions.is_some(),
            sync: true,
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        persist::ensure_parent_dir(&self.config.path)
            .await
            .map_err(|e| {
                StorageError::Connection(format!(
                    "cannot create directory for {}: {e}",
                    self.config.path.display()
                ))
            })?;

        let conn = self.open().map_err(|e| {
            StorageError::Connection(format!(
                "cannot open {} ({}): {e}",
                self.config.path.display(),
                self.config.connection_label()
            ))
        })?;

        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(conn);
            info!(
                path = %self.config.path.display(),
                backend = %self.kind(),
                target = %self.config.connection_label(),
                "Relational store opened"
            );
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        if self.mode == RelationalMode::Embedded {
            embedded::persist_to_file(&conn, &self.config.path)?;
        }
        conn.close().map_err(|(_, e)| StorageError::Database(e))?;
        info!(path = %self.config.path.display(), "Relational store closed");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.read(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .is_ok()
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    async fn insert_context(&self, context: NewContext) -> Result<Id> {
        context.validate()?;
        let entry = ContextEntry::from_new(new_id(), now(), context);
        self.write(|conn| context_ops::insert_context(conn, &entry))?;
        Ok(entry.id)
    }

    async fn insert_context_with_id(&self, entry: ContextEntry) -> Result<()> {
        validate_importance(entry.importance)?;
        self.write(|conn| {
            if context_ops::context_exists(conn, &entry.id)? {
                return Err(StorageError::Protected {
                    entity: "context",
                    name: entry.id.clone(),
                });
            }
            context_ops::insert_context(conn, &entry)
        })
    }

    async fn get_context(&self, id: &str) -> Result<Option<ContextEntry>> {
        self.read(|conn| context_ops::get_context(conn, id))
    }

    async fn list_contexts(&self, options: &SearchOptions) -> Result<Vec<ContextEntry>> {
        self.read(|conn| context_ops::list_contexts(conn, options))
    }

    async fn update_context(&self, id: &str, patch: ContextPatch) -> Result<()> {
        patch.validate()?;
        self.write(|conn| context_ops::update_context(conn, id, &patch))
    }

    async fn delete_context(&self, id: &str) -> Result<()> {
        self.write(|conn| context_ops::delete_context(conn, id))
    }

    // ── Agents ───────────────────────────────────────────────────────────

    async fn insert_agent(&self, agent: NewAgent) -> Result<Id> {
        agent.validate()?;
        let agent = agent.into_agent(new_id());
        self.write(|conn| agent_ops::insert_agent(conn, &agent))?;
        Ok(agent.id)
    }

    async fn insert_agent_with_id(&self, agent: DatabaseAgent) -> Result<()> {
        let missing = agent.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::InvalidData(format!(
                "agent is missing required fields: {}",
                missing.join(", ")
            )));
        }
        self.write(|conn| {
            if let Some(existing) = agent_ops::get_agent(conn, &agent.id)? {
                return Err(StorageError::Protected {
                    entity: "agent",
                    name: existing.name,
                });
            }
            agent_ops::insert_agent(conn, &agent)
        })
    }

    async fn get_agent(&self, id: &str) -> Result<Option<DatabaseAgent>> {
        self.read(|conn| agent_ops::get_agent(conn, id))
    }

    async fn list_agents(&self) -> Result<Vec<DatabaseAgent>> {
        self.read(agent_ops::list_agents)
    }

    async fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<()> {
        patch.validate()?;
        self.write(|conn| agent_ops::update_agent(conn, id, &patch))
    }

    async fn delete_agent(&self, id: &str) -> Result<()> {
        self.write(|conn| agent_ops::delete_agent(conn, id))
    }

    async fn replace_agent(&self, old_id: &str, agent: DatabaseAgent) -> Result<()> {
        let missing = agent.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::InvalidData(format!(
                "agent is missing required fields: {}",
                missing.join(", ")
            )));
        }
        self.write(|conn| agent_ops::replace_agent(conn, old_id, &agent))
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    async fn stats(&self, filter: Option<&StatsFilter>) -> Result<DatabaseStats> {
        let kind = self.kind();
        self.read(|conn| {
            let total_agents = agent_ops::count_agents(conn)?;
            let mut stats = context_ops::context_stats(conn, kind, filter, total_agents)?;

            let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
            let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
            stats.storage_size_bytes = Some((page_count * page_size) as u64);

            stats.last_sync = schema::get_meta(conn, LAST_SYNC_KEY)?
                .map(|value| decode_timestamp(&value))
                .transpose()?;
            Ok(stats)
        })
    }

    // ── Optional capabilities ────────────────────────────────────────────

    async fn export_data(&self) -> Result<DataSnapshot> {
        self.read(|conn| {
            let contexts = context_ops::list_contexts(conn, &SearchOptions::default())?;
            let agents = agent_ops::list_agents(conn)?;
            Ok(DataSnapshot::new(contexts, agents))
        })
    }

    async fn import_data(&self, snapshot: DataSnapshot) -> Result<ImportReport> {
        let report = import_snapshot(self, snapshot).await?;
        info!(
            contexts = report.contexts_imported,
            agents = report.agents_imported,
            skipped = report.skipped,
            backend = %self.kind(),
            "Imported snapshot"
        );
        Ok(report)
    }

    async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SimilarityMatch>> {
        let dims = self.dimensions()?;
        self.read(|conn| vector_ops::search_similar(conn, dims, embedding, limit))
    }

    async fn store_embedding(&self, context_id: &str, embedding: &[f32]) -> Result<()> {
        let dims = self.dimensions()?;
        self.write(|conn| vector_ops::store_embedding(conn, dims, context_id, embedding))
    }

    async fn sync_with(&self, target: &dyn DatabaseAdapter) -> Result<SyncReport> {
        let report = sync_into(self, target).await?;
        let synced_at = encode_timestamp(&now());
        self.write(|conn| schema::set_meta(conn, LAST_SYNC_KEY, &synced_at))?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxvault_types::ContextType;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> RelationalConfig {
        RelationalConfig::new(dir.path().join("db").join("context.db"))
    }

    #[test]
    fn test_timestamp_encoding_roundtrip() {
        let ts = now();
        let encoded = encode_timestamp(&ts);
        assert!(encoded.ends_with('Z'));
        assert_eq!(decode_timestamp(&encoded).unwrap(), ts);
        assert!(decode_timestamp("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_native_connect_seeds_agents() {
        let dir = TempDir::new().unwrap();
        let adapter = RelationalAdapter::native(config(&dir));
        adapter.connect().await.unwrap();
        adapter.connect().await.unwrap();

        assert!(adapter.health_check().await);
        assert_eq!(adapter.list_agents().await.unwrap().len(), 3);
        assert_eq!(adapter.stats(None).await.unwrap().total_contexts, 0);
        assert_eq!(adapter.kind(), BackendKind::Relational);
        assert!(!adapter.capabilities().vector_search);
    }

    #[tokio::test]
    async fn test_embedded_persists_every_mutation() {
        let dir = TempDir::new().unwrap();
        let adapter = RelationalAdapter::embedded(config(&dir));
        adapter.connect().await.unwrap();

        let id = adapter
            .insert_context(NewContext::new("/p", ContextType::Issue, "flaky test"))
            .await
            .unwrap();

        // A second engine loading the file sees the write without a disconnect.
        let observer = RelationalAdapter::embedded(config(&dir));
        observer.connect().await.unwrap();
        assert!(observer.get_context(&id).await.unwrap().is_some());
        assert_eq!(observer.list_agents().await.unwrap().len(), 3);
        assert_eq!(observer.kind(), BackendKind::EmbeddedRelational);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let dir = TempDir::new().unwrap();
        let adapter = RelationalAdapter::native(config(&dir));
        assert!(!adapter.health_check().await);
        assert!(matches!(
            adapter.list_agents().await,
            Err(StorageError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_vector_capability_follows_config() {
        let dir = TempDir::new().unwrap();
        let plain = RelationalAdapter::native(config(&dir));
        plain.connect().await.unwrap();
        assert!(matches!(
            plain.vector_search(&[1.0], 1).await,
            Err(StorageError::Unsupported { .. })
        ));
        plain.disconnect().await.unwrap();

        let vectors = RelationalAdapter::native(config(&dir).with_vector_dimensions(2));
        vectors.connect().await.unwrap();
        assert!(vectors.capabilities().vector_search);
        let id = vectors
            .insert_context(NewContext::new("/p", ContextType::Code, "embedding"))
            .await
            .unwrap();
        vectors.store_embedding(&id, &[0.6, 0.8]).await.unwrap();
        let hits = vectors.vector_search(&[0.6, 0.8], 5).await.unwrap();
        assert_eq!(hits[0].context_id, id);
    }

    #[tokio::test]
    async fn test_sync_records_last_sync() {
        let dir = TempDir::new().unwrap();
        let source = RelationalAdapter::native(config(&dir));
        source.connect().await.unwrap();
        source
            .insert_context(NewContext::new("/p", ContextType::Note, "shared"))
            .await
            .unwrap();

        let target = RelationalAdapter::embedded(RelationalConfig::new(
            dir.path().join("mirror.db"),
        ));
        target.connect().await.unwrap();

        let report = source.sync_with(&target).await.unwrap();
        assert_eq!(report.contexts_copied, 1);
        // Seed agents have fresh ids on each side, so their names collide.
        assert_eq!(report.agents_copied, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.failed, 0);
        assert!(source.stats(None).await.unwrap().last_sync.is_some());
        assert_eq!(target.stats(None).await.unwrap().total_contexts, 1);
    }

    #[tokio::test]
    async fn test_embedded_write_reverts_when_file_unwritable() {
        let dir = TempDir::new().unwrap();
        let adapter = RelationalAdapter::embedded(config(&dir));
        adapter.connect().await.unwrap();
        let kept = adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "persisted"))
            .await
            .unwrap();

        let parent = dir.path().join("db");
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, b"not a directory").unwrap();

        let result = adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "lost"))
            .await;
        assert!(result.is_err());

        let contents: Vec<_> = adapter
            .list_contexts(&SearchOptions::default())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(contents, vec![kept]);
        assert_eq!(adapter.list_agents().await.unwrap().len(), 3);
    }
}
