//! Primary backend with a mirrored secondary.
//!
//! Reads, stats and optional capabilities come from the primary. Every
//! mutation goes to the primary first; when mirroring is on, the stored
//! record is then written to the secondary with the same identity. Mirror
//! failures are logged and never surfaced to the caller.

use async_trait::async_trait;
use tracing::{info, warn};

use ctxvault_types::{
    AgentPatch, BackendKind, Capabilities, ContextEntry, ContextPatch, DataSnapshot,
    DatabaseAgent, DatabaseStats, Id, ImportReport, NewAgent, NewContext, SearchOptions,
    SimilarityMatch, StatsFilter, SyncReport,
};

use crate::adapter::{DatabaseAdapter, sync_into};
use crate::error::Result;

pub struct HybridAdapter {
    primary: Box<dyn DatabaseAdapter>,
    secondary: Box<dyn DatabaseAdapter>,
    mirror_writes: bool,
}

impl std::fmt::Debug for HybridAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridAdapter")
            .field("primary", &self.primary.kind())
            .field("secondary", &self.secondary.kind())
            .field("mirror_writes", &self.mirror_writes)
            .finish()
    }
}

impl HybridAdapter {
    pub fn new(
        primary: Box<dyn DatabaseAdapter>,
        secondary: Box<dyn DatabaseAdapter>,
        mirror_writes: bool,
    ) -> Self {
        Self {
            primary,
            secondary,
            mirror_writes,
        }
    }

    pub fn primary(&self) -> &dyn DatabaseAdapter {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> &dyn DatabaseAdapter {
        self.secondary.as_ref()
    }

    fn mirror_outcome(&self, operation: &str, id: &str, outcome: Result<()>) {
        if let Err(e) = outcome {
            warn!(
                operation,
                id,
                secondary = %self.secondary.kind(),
                error = %e,
                "Mirror write failed"
            );
        }
    }

    async fn mirror_context(&self, operation: &str, id: &str) {
        let outcome = match self.primary.get_context(id).await {
            Ok(Some(entry)) => self.secondary.insert_context_with_id(entry).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        self.mirror_outcome(operation, id, outcome);
    }

    async fn mirror_agent(&self, operation: &str, id: &str) {
        let outcome = match self.primary.get_agent(id).await {
            Ok(Some(agent)) => self.secondary.insert_agent_with_id(agent).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        self.mirror_outcome(operation, id, outcome);
    }

    /// Give the secondary the primary's agent ids, matching agents by name.
    ///
    /// Each side seeds its canonical agents with its own ids.
    async fn align_secondary_agents(&self) -> Result<usize> {
        let secondary_agents = self.secondary.list_agents().await?;
        let mut aligned = 0;

        for agent in self.primary.list_agents().await? {
            if secondary_agents.iter().any(|s| s.id == agent.id) {
                continue;
            }
            let id = agent.id.clone();
            let outcome = match secondary_agents.iter().find(|s| s.name == agent.name) {
                Some(existing) => self.secondary.replace_agent(&existing.id, agent).await,
                None => self.secondary.insert_agent_with_id(agent).await,
            };
            match outcome {
                Ok(()) => aligned += 1,
                Err(e) => self.mirror_outcome("align agent", &id, Err(e)),
            }
        }
        Ok(aligned)
    }
}

#[async_trait]
impl DatabaseAdapter for HybridAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Hybrid
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sync: true,
            ..self.primary.capabilities()
        }
    }

    fn is_connected(&self) -> bool {
        self.primary.is_connected() && self.secondary.is_connected()
    }

    async fn connect(&self) -> Result<()> {
        self.primary.connect().await?;
        self.secondary.connect().await?;
        if self.mirror_writes {
            match self.align_secondary_agents().await {
                Ok(0) => {}
                Ok(aligned) => info!(aligned, "Aligned secondary agents with primary"),
                Err(e) => warn!(error = %e, "Could not align secondary agents"),
            }
        }
        info!(
            primary = %self.primary.kind(),
            secondary = %self.secondary.kind(),
            mirror_writes = self.mirror_writes,
            "Hybrid store connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let primary = self.primary.disconnect().await;
        let secondary = self.secondary.disconnect().await;
        primary.and(secondary)
    }

    async fn health_check(&self) -> bool {
        let healthy = self.primary.health_check().await;
        if healthy && !self.secondary.health_check().await {
            warn!(secondary = %self.secondary.kind(), "Hybrid secondary is unhealthy");
        }
        healthy
    }

    async fn flush(&self) -> Result<()> {
        let primary = self.primary.flush().await;
        let secondary = self.secondary.flush().await;
        primary.and(secondary)
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    async fn insert_context(&self, context: NewContext) -> Result<Id> {
        let id = self.primary.insert_context(context).await?;
        if self.mirror_writes {
            self.mirror_context("insert context", &id).await;
        }
        Ok(id)
    }

    async fn insert_context_with_id(&self, entry: ContextEntry) -> Result<()> {
        let mirrored = self.mirror_writes.then(|| entry.clone());
        self.primary.insert_context_with_id(entry).await?;
        if let Some(entry) = mirrored {
            let id = entry.id.clone();
            let outcome = self.secondary.insert_context_with_id(entry).await;
            self.mirror_outcome("insert context", &id, outcome);
        }
        Ok(())
    }

    async fn get_context(&self, id: &str) -> Result<Option<ContextEntry>> {
        self.primary.get_context(id).await
    }

    async fn list_contexts(&self, options: &SearchOptions) -> Result<Vec<ContextEntry>> {
        self.primary.list_contexts(options).await
    }

    async fn update_context(&self, id: &str, patch: ContextPatch) -> Result<()> {
        let mirrored = self.mirror_writes.then(|| patch.clone());
        self.primary.update_context(id, patch).await?;
        if let Some(patch) = mirrored {
            let outcome = self.secondary.update_context(id, patch).await;
            self.mirror_outcome("update context", id, outcome);
        }
        Ok(())
    }

    async fn delete_context(&self, id: &str) -> Result<()> {
        self.primary.delete_context(id).await?;
        if self.mirror_writes {
            let outcome = self.secondary.delete_context(id).await;
            self.mirror_outcome("delete context", id, outcome);
        }
        Ok(())
    }

    // ── Agents ───────────────────────────────────────────────────────────

    async fn insert_agent(&self, agent: NewAgent) -> Result<Id> {
        let id = self.primary.insert_agent(agent).await?;
        if self.mirror_writes {
            self.mirror_agent("insert agent", &id).await;
        }
        Ok(id)
    }

    async fn insert_agent_with_id(&self, agent: DatabaseAgent) -> Result<()> {
        let id = agent.id.clone();
        self.primary.insert_agent_with_id(agent).await?;
        if self.mirror_writes {
            self.mirror_agent("insert agent", &id).await;
        }
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> Result<Option<DatabaseAgent>> {
        self.primary.get_agent(id).await
    }

    async fn list_agents(&self) -> Result<Vec<DatabaseAgent>> {
        self.primary.list_agents().await
    }

    async fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<()> {
        let mirrored = self.mirror_writes.then(|| patch.clone());
        self.primary.update_agent(id, patch).await?;
        if let Some(patch) = mirrored {
            let outcome = self.secondary.update_agent(id, patch).await;
            self.mirror_outcome("update agent", id, outcome);
        }
        Ok(())
    }

    async fn delete_agent(&self, id: &str) -> Result<()> {
        self.primary.delete_agent(id).await?;
        if self.mirror_writes {
            let outcome = self.secondary.delete_agent(id).await;
            self.mirror_outcome("delete agent", id, outcome);
        }
        Ok(())
    }

    async fn replace_agent(&self, old_id: &str, agent: DatabaseAgent) -> Result<()> {
        let mirrored = self.mirror_writes.then(|| agent.clone());
        self.primary.replace_agent(old_id, agent).await?;
        if let Some(agent) = mirrored {
            let outcome = self.secondary.replace_agent(old_id, agent).await;
            self.mirror_outcome("replace agent", old_id, outcome);
        }
        Ok(())
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    async fn stats(&self, filter: Option<&StatsFilter>) -> Result<DatabaseStats> {
        let mut stats = self.primary.stats(filter).await?;
        stats.adapter = BackendKind::Hybrid;
        Ok(stats)
    }

    // ── Optional capabilities ────────────────────────────────────────────

    async fn export_data(&self) -> Result<DataSnapshot> {
        self.primary.export_data().await
    }

    async fn import_data(&self, snapshot: DataSnapshot) -> Result<ImportReport> {
        let mirrored = self.mirror_writes.then(|| snapshot.clone());
        let report = self.primary.import_data(snapshot).await?;
        if let Some(snapshot) = mirrored {
            if let Err(e) = self.secondary.import_data(snapshot).await {
                warn!(error = %e, "Mirror import failed");
            }
        }
        Ok(report)
    }

    async fn vector_search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SimilarityMatch>> {
        self.primary.vector_search(embedding, limit).await
    }

    async fn store_embedding(&self, context_id: &str, embedding: &[f32]) -> Result<()> {
        self.primary.store_embedding(context_id, embedding).await
    }

    async fn sync_with(&self, target: &dyn DatabaseAdapter) -> Result<SyncReport> {
        sync_into(self.primary.as_ref(), target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentAdapter;
    use crate::error::StorageError;
    use crate::relational::RelationalAdapter;
    use ctxvault_config::{DocumentConfig, RelationalConfig};
    use ctxvault_types::ContextType;
    use tempfile::TempDir;

    fn hybrid(dir: &TempDir, mirror: bool) -> HybridAdapter {
        HybridAdapter::new(
            Box::new(RelationalAdapter::native(RelationalConfig::new(
                dir.path().join("context.db"),
            ))),
            Box::new(DocumentAdapter::new(
                DocumentConfig::new(dir.path().join("context-db.json"))
                    .with_flush_debounce_ms(10),
            )),
            mirror,
        )
    }

    #[tokio::test]
    async fn test_mutations_are_mirrored() {
        let dir = TempDir::new().unwrap();
        let adapter = hybrid(&dir, true);
        adapter.connect().await.unwrap();

        let id = adapter
            .insert_context(NewContext::new("/p", ContextType::Decision, "Use X"))
            .await
            .unwrap();
        let mirrored = adapter.secondary().get_context(&id).await.unwrap().unwrap();
        assert_eq!(Some(mirrored), adapter.get_context(&id).await.unwrap());

        adapter
            .update_context(
                &id,
                ContextPatch {
                    importance: Some(2),
                    ..ContextPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            adapter
                .secondary()
                .get_context(&id)
                .await
                .unwrap()
                .unwrap()
                .importance,
            2
        );

        adapter.delete_context(&id).await.unwrap();
        assert!(adapter.secondary().get_context(&id).await.unwrap().is_none());

        let agent_id = adapter
            .insert_agent(NewAgent::custom("Docs", "Writes docs"))
            .await
            .unwrap();
        assert!(adapter.secondary().get_agent(&agent_id).await.unwrap().is_some());

        adapter.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_and_stats_come_from_primary() {
        let dir = TempDir::new().unwrap();
        let adapter = hybrid(&dir, false);
        adapter.connect().await.unwrap();

        adapter
            .insert_context(NewContext::new("/p", ContextType::Note, "primary only"))
            .await
            .unwrap();

        let stats = adapter.stats(None).await.unwrap();
        assert_eq!(stats.adapter, BackendKind::Hybrid);
        // The relational primary starts empty; the document secondary holds its welcome entry.
        assert_eq!(stats.total_contexts, 1);
        assert_eq!(
            adapter.secondary().stats(None).await.unwrap().total_contexts,
            1
        );
        assert!(adapter.capabilities().sync);
        assert!(matches!(
            adapter.vector_search(&[1.0], 1).await,
            Err(StorageError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_secondary_seed_agents_take_primary_ids() {
        let dir = TempDir::new().unwrap();
        let adapter = hybrid(&dir, true);
        adapter.connect().await.unwrap();

        let ids = |agents: Vec<DatabaseAgent>| -> Vec<(String, String)> {
            agents.into_iter().map(|a| (a.name, a.id)).collect()
        };
        let primary = ids(adapter.primary().list_agents().await.unwrap());
        assert_eq!(primary.len(), 3);
        assert_eq!(ids(adapter.secondary().list_agents().await.unwrap()), primary);

        let seed_id = &primary[0].1;
        adapter
            .update_agent(
                seed_id,
                AgentPatch {
                    enabled: Some(false),
                    ..AgentPatch::default()
                },
            )
            .await
            .unwrap();
        let mirrored = adapter.secondary().get_agent(seed_id).await.unwrap().unwrap();
        assert!(!mirrored.enabled);
        adapter.disconnect().await.unwrap();

        // A second connect finds nothing left to align.
        let reopened = hybrid(&dir, true);
        reopened.connect().await.unwrap();
        assert_eq!(reopened.align_secondary_agents().await.unwrap(), 0);
        reopened.disconnect().await.unwrap();
    }
}
