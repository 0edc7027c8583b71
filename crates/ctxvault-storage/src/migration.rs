//! One-time upgrade of a legacy flat JSON store into the active backend.
//!
//! The legacy file is read once, every record is re-inserted through the
//! identity-preserving inserts, and a completion marker is written beside
//! the active store. Later runs see the marker and do nothing. Per-record
//! failures are counted and logged; they never abort the batch.
//!
//! Accepted legacy shapes:
//!
//! ```json
//! { "contexts": [ { "id": "...", "projectPath": "...", "type": "decision", ... } ],
//!   "agents": [ { "id": "...", "name": "...", ... } ] }
//! ```
//!
//! or a bare array of context records. Timestamps may be RFC 3339 strings
//! or epoch milliseconds.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use ctxvault_config::{LEGACY_FILE_NAME, MIGRATION_MARKER_FILE};
use ctxvault_types::{
    CANONICAL_AGENT_NAMES, ContextEntry, ContextType, DatabaseAgent, GLOBAL_PROJECT,
    MAX_IMPORTANCE, MIN_IMPORTANCE, Timestamp, new_id, now,
};

use crate::adapter::DatabaseAdapter;
use crate::error::{Result, StorageError};
use crate::persist::{atomic_write, ensure_parent_dir, sibling_with_suffix};

/// Importance given to legacy records that carry none.
const DEFAULT_LEGACY_IMPORTANCE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    NotStarted,
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The completion marker was already present.
    AlreadyCompleted,
    /// No legacy file existed; the marker has been written.
    NoLegacyData,
    Migrated(MigrationReport),
}

/// Counts from one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub contexts_migrated: usize,
    pub agents_migrated: usize,
    /// Records whose id (or agent name) already existed in the target.
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.contexts_migrated + self.agents_migrated + self.skipped + self.failed
    }

    /// Turn per-record failures into [`StorageError::MigrationPartial`].
    pub fn ensure_complete(&self) -> Result<()> {
        if self.failed > 0 {
            return Err(StorageError::MigrationPartial {
                failed: self.failed,
                total: self.total(),
            });
        }
        Ok(())
    }
}

/// Persisted completion flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrationMarker {
    completed_at: Timestamp,
    #[serde(default)]
    source: Option<PathBuf>,
    contexts_migrated: usize,
    agents_migrated: usize,
    skipped: usize,
    failed: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyFile {
    Store {
        #[serde(default)]
        contexts: Vec<serde_json::Value>,
        #[serde(default)]
        agents: Vec<serde_json::Value>,
    },
    Contexts(Vec<serde_json::Value>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyTimestamp {
    Millis(i64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyContext {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "project_path", alias = "project")]
    project_path: Option<String>,
    #[serde(rename = "type", alias = "contextType")]
    context_type: String,
    content: String,
    timestamp: LegacyTimestamp,
    #[serde(default)]
    importance: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAgent {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    emoji: Option<String>,
    #[serde(default)]
    specializations: Vec<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default, alias = "is_custom")]
    is_custom: Option<bool>,
    #[serde(default)]
    prompt: Option<String>,
}

fn parse_legacy_timestamp(raw: LegacyTimestamp) -> std::result::Result<Timestamp, String> {
    let parsed = match raw {
        LegacyTimestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .ok_or_else(|| format!("timestamp {ms} is out of range"))?,
        LegacyTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map_err(|e| format!("timestamp '{text}': {e}"))?
            .with_timezone(&Utc),
    };
    Ok(parsed.trunc_subsecs(6))
}

fn clamp_importance(id: &str, raw: Option<i64>) -> u8 {
    let value = raw.unwrap_or(DEFAULT_LEGACY_IMPORTANCE);
    let clamped = value.clamp(i64::from(MIN_IMPORTANCE), i64::from(MAX_IMPORTANCE));
    if clamped != value {
        warn!(context_id = %id, importance = value, clamped, "Clamped legacy importance");
    }
    clamped as u8
}

fn convert_context(value: serde_json::Value) -> std::result::Result<ContextEntry, String> {
    let legacy: LegacyContext = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let id = legacy.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(new_id);
    let context_type = legacy
        .context_type
        .parse::<ContextType>()
        .map_err(|e| e.to_string())?;

    Ok(ContextEntry {
        importance: clamp_importance(&id, legacy.importance),
        timestamp: parse_legacy_timestamp(legacy.timestamp)?,
        project_path: legacy
            .project_path
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| GLOBAL_PROJECT.to_string()),
        context_type,
        content: legacy.content,
        tags: legacy.tags,
        id,
    })
}

fn convert_agent(value: serde_json::Value) -> std::result::Result<DatabaseAgent, String> {
    let legacy: LegacyAgent = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let is_custom = legacy
        .is_custom
        .unwrap_or_else(|| !CANONICAL_AGENT_NAMES.contains(&legacy.name.as_str()));

    Ok(DatabaseAgent {
        id: legacy.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(new_id),
        name: legacy.name,
        description: legacy.description,
        emoji: legacy.emoji,
        specializations: legacy.specializations,
        color: legacy.color,
        enabled: legacy.enabled.unwrap_or(true),
        is_custom,
        prompt: legacy.prompt,
    })
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives the legacy-store migration.
#[derive(Debug)]
pub struct LegacyMigrator {
    legacy_path: PathBuf,
    marker_path: PathBuf,
    running: AtomicBool,
}

impl LegacyMigrator {
    pub fn new(legacy_path: impl Into<PathBuf>, marker_path: impl Into<PathBuf>) -> Self {
        Self {
            legacy_path: legacy_path.into(),
            marker_path: marker_path.into(),
            running: AtomicBool::new(false),
        }
    }

    /// `contexts.json` and `.migration-complete` inside `data_dir`.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self::new(
            data_dir.join(LEGACY_FILE_NAME),
            data_dir.join(MIGRATION_MARKER_FILE),
        )
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub async fn state(&self) -> MigrationState {
        if self.running.load(Ordering::SeqCst) {
            MigrationState::Running
        } else if fs::try_exists(&self.marker_path).await.unwrap_or(false) {
            MigrationState::Completed
        } else {
            MigrationState::NotStarted
        }
    }

    /// Migrate the legacy store into `target`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Conflict`] if a run is already in progress on this
    /// migrator, [`StorageError::InvalidData`] if the legacy file is not a
    /// recognizable store, or an I/O error if the marker cannot be written.
    pub async fn run(&self, target: &dyn DatabaseAdapter) -> Result<MigrationOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Conflict(
                "migration is already running".to_string(),
            ));
        }
        let _guard = RunningGuard(&self.running);

        if fs::try_exists(&self.marker_path).await? {
            debug!(marker = %self.marker_path.display(), "Migration already completed");
            return Ok(MigrationOutcome::AlreadyCompleted);
        }

        if !fs::try_exists(&self.legacy_path).await? {
            info!(legacy = %self.legacy_path.display(), "No legacy store found");
            self.write_marker(None, &MigrationReport::default()).await?;
            return Ok(MigrationOutcome::NoLegacyData);
        }

        info!(legacy = %self.legacy_path.display(), target = %target.kind(), "Migrating legacy store");
        let raw = fs::read(&self.legacy_path).await?;
        let (contexts, agents) = match serde_json::from_slice::<LegacyFile>(&raw) {
            Ok(LegacyFile::Store { contexts, agents }) => (contexts, agents),
            Ok(LegacyFile::Contexts(contexts)) => (contexts, Vec::new()),
            Err(e) => {
                return Err(StorageError::InvalidData(format!(
                    "legacy store {} is not readable: {e}",
                    self.legacy_path.display()
                )));
            }
        };

        let mut report = MigrationReport::default();
        self.migrate_agents(target, agents, &mut report).await?;
        self.migrate_contexts(target, contexts, &mut report).await?;
        target.flush().await?;

        self.write_marker(Some(self.legacy_path.clone()), &report)
            .await?;

        let backup = sibling_with_suffix(&self.legacy_path, ".backup");
        match fs::copy(&self.legacy_path, &backup).await {
            Ok(_) => report.backup_path = Some(backup),
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "Failed to back up legacy store");
            }
        }

        info!(
            contexts = report.contexts_migrated,
            agents = report.agents_migrated,
            skipped = report.skipped,
            failed = report.failed,
            "Migration complete"
        );
        Ok(MigrationOutcome::Migrated(report))
    }

    async fn migrate_agents(
        &self,
        target: &dyn DatabaseAdapter,
        records: Vec<serde_json::Value>,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let mut taken: Vec<String> = target
            .list_agents()
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect();

        for (index, record) in records.into_iter().enumerate() {
            let agent = match convert_agent(record) {
                Ok(agent) => agent,
                Err(reason) => {
                    warn!(index, %reason, "Skipping malformed legacy agent");
                    report.failed += 1;
                    continue;
                }
            };

            if taken.contains(&agent.name) || target.get_agent(&agent.id).await?.is_some() {
                debug!(agent_id = %agent.id, name = %agent.name, "Legacy agent already present");
                report.skipped += 1;
                continue;
            }

            let (id, name) = (agent.id.clone(), agent.name.clone());
            match target.insert_agent_with_id(agent).await {
                Ok(()) => {
                    report.agents_migrated += 1;
                    taken.push(name);
                }
                Err(StorageError::Conflict(_) | StorageError::Protected { .. }) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(agent_id = %id, error = %e, "Failed to migrate agent");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn migrate_contexts(
        &self,
        target: &dyn DatabaseAdapter,
        records: Vec<serde_json::Value>,
        report: &mut MigrationReport,
    ) -> Result<()> {
        for (index, record) in records.into_iter().enumerate() {
            let entry = match convert_context(record) {
                Ok(entry) => entry,
                Err(reason) => {
                    warn!(index, %reason, "Skipping malformed legacy context");
                    report.failed += 1;
                    continue;
                }
            };

            if target.get_context(&entry.id).await?.is_some() {
                report.skipped += 1;
                continue;
            }

            let id = entry.id.clone();
            match target.insert_context_with_id(entry).await {
                Ok(()) => report.contexts_migrated += 1,
                Err(StorageError::Protected { .. }) => report.skipped += 1,
                Err(e) => {
                    warn!(context_id = %id, error = %e, "Failed to migrate context");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn write_marker(&self, source: Option<PathBuf>, report: &MigrationReport) -> Result<()> {
        let marker = MigrationMarker {
            completed_at: now(),
            source,
            contexts_migrated: report.contexts_migrated,
            agents_migrated: report.agents_migrated,
            skipped: report.skipped,
            failed: report.failed,
        };
        ensure_parent_dir(&self.marker_path).await?;
        atomic_write(&self.marker_path, &serde_json::to_vec_pretty(&marker)?).await
    }
}

/// An agent row with required fields left blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteAgent {
    pub id: String,
    pub name: String,
    pub missing_fields: Vec<String>,
}

/// Result of checking the agent catalog after migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentValidationReport {
    pub passed: bool,
    pub missing_canonical: Vec<String>,
    pub incomplete_agents: Vec<IncompleteAgent>,
    pub agent_count: usize,
}

/// Confirm the canonical agents exist and every agent is complete.
pub async fn validate_agents(adapter: &dyn DatabaseAdapter) -> Result<AgentValidationReport> {
    let agents = adapter.list_agents().await?;

    let missing_canonical: Vec<String> = CANONICAL_AGENT_NAMES
        .iter()
        .filter(|name| !agents.iter().any(|a| a.name == **name))
        .map(|name| name.to_string())
        .collect();

    let incomplete_agents: Vec<IncompleteAgent> = agents
        .iter()
        .filter_map(|agent| {
            let missing = agent.missing_fields();
            (!missing.is_empty()).then(|| IncompleteAgent {
                id: agent.id.clone(),
                name: agent.name.clone(),
                missing_fields: missing.into_iter().map(String::from).collect(),
            })
        })
        .collect();

    let report = AgentValidationReport {
        passed: missing_canonical.is_empty() && incomplete_agents.is_empty(),
        missing_canonical,
        incomplete_agents,
        agent_count: agents.len(),
    };
    if !report.passed {
        warn!(
            missing = ?report.missing_canonical,
            incomplete = report.incomplete_agents.len(),
            "Agent validation failed"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentAdapter;
    use crate::relational::RelationalAdapter;
    use ctxvault_config::{DocumentConfig, RelationalConfig};
    use ctxvault_types::{AgentPatch, SearchOptions};
    use tempfile::TempDir;

    async fn relational(dir: &TempDir) -> RelationalAdapter {
        let adapter = RelationalAdapter::native(RelationalConfig::new(dir.path().join("context.db")));
        adapter.connect().await.unwrap();
        adapter
    }

    fn write_legacy(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(LEGACY_FILE_NAME);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_timestamp_formats() {
        let millis = parse_legacy_timestamp(LegacyTimestamp::Millis(1_700_000_000_123)).unwrap();
        let text = parse_legacy_timestamp(LegacyTimestamp::Text(
            "2023-11-14T22:13:20.123Z".to_string(),
        ))
        .unwrap();
        assert_eq!(millis, text);
        assert!(parse_legacy_timestamp(LegacyTimestamp::Text("yesterday".to_string())).is_err());
    }

    #[tokio::test]
    async fn test_migrates_store_object() {
        let dir = TempDir::new().unwrap();
        let legacy = write_legacy(
            &dir,
            r#"{
                "contexts": [
                    {"id": "c1", "projectPath": "/p", "type": "decision", "content": "Use X",
                     "timestamp": "2024-01-02T03:04:05Z", "importance": 9, "tags": ["arch"]},
                    {"id": "c2", "projectPath": "/p", "type": "code", "content": "loud",
                     "timestamp": 1704164645000, "importance": 42},
                    {"id": "c3", "projectPath": "/p", "type": "telepathy", "content": "?",
                     "timestamp": 1704164645000}
                ],
                "agents": [
                    {"id": "a1", "name": "Docs", "description": "Writes docs", "isCustom": true},
                    {"id": "a2", "name": "Architect", "description": "Duplicate seed"}
                ]
            }"#,
        );
        let adapter = relational(&dir).await;
        let migrator = LegacyMigrator::new(&legacy, dir.path().join(MIGRATION_MARKER_FILE));
        assert_eq!(migrator.state().await, MigrationState::NotStarted);

        let MigrationOutcome::Migrated(report) = migrator.run(&adapter).await.unwrap() else {
            panic!("expected a migration");
        };
        assert_eq!(report.contexts_migrated, 2);
        assert_eq!(report.agents_migrated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.ensure_complete(),
            Err(StorageError::MigrationPartial { failed: 1, total: 5 })
        ));

        let c1 = adapter.get_context("c1").await.unwrap().unwrap();
        assert_eq!(c1.tags, vec!["arch".to_string()]);
        assert_eq!(adapter.get_context("c2").await.unwrap().unwrap().importance, 10);
        assert!(adapter.get_agent("a1").await.unwrap().unwrap().is_custom);

        assert_eq!(migrator.state().await, MigrationState::Completed);
        assert!(report.backup_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = TempDir::new().unwrap();
        write_legacy(
            &dir,
            r#"[{"id": "c1", "projectPath": "/p", "type": "note", "content": "n",
                 "timestamp": 1704164645000}]"#,
        );
        let adapter = relational(&dir).await;
        let migrator = LegacyMigrator::for_data_dir(dir.path());

        assert!(matches!(
            migrator.run(&adapter).await.unwrap(),
            MigrationOutcome::Migrated(_)
        ));
        assert_eq!(
            migrator.run(&adapter).await.unwrap(),
            MigrationOutcome::AlreadyCompleted
        );
        assert_eq!(
            adapter.list_contexts(&SearchOptions::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_absent_legacy_file_completes() {
        let dir = TempDir::new().unwrap();
        let adapter = relational(&dir).await;
        let migrator = LegacyMigrator::for_data_dir(dir.path());

        assert_eq!(
            migrator.run(&adapter).await.unwrap(),
            MigrationOutcome::NoLegacyData
        );
        assert!(migrator.marker_path().exists());
        assert_eq!(migrator.state().await, MigrationState::Completed);
    }

    #[tokio::test]
    async fn test_unreadable_legacy_file_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        write_legacy(&dir, "not json at all");
        let adapter = relational(&dir).await;
        let migrator = LegacyMigrator::for_data_dir(dir.path());

        assert!(matches!(
            migrator.run(&adapter).await,
            Err(StorageError::InvalidData(_))
        ));
        assert_eq!(migrator.state().await, MigrationState::NotStarted);
    }

    #[tokio::test]
    async fn test_validate_agents() {
        let dir = TempDir::new().unwrap();
        let document = DocumentAdapter::new(DocumentConfig::new(dir.path().join("context-db.json")));
        document.connect().await.unwrap();

        let report = validate_agents(&document).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.agent_count, 3);

        let architect = document
            .list_agents()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.name == "Architect")
            .unwrap();
        document
            .update_agent(
                &architect.id,
                AgentPatch {
                    name: Some("Lead".to_string()),
                    ..AgentPatch::default()
                },
            )
            .await
            .unwrap();

        let report = validate_agents(&document).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.missing_canonical, vec!["Architect".to_string()]);
        document.disconnect().await.unwrap();
    }
}
