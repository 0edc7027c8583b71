//! Schema creation and versioning.
//!
//! The version is tracked in `PRAGMA user_version`. Every statement is
//! create-if-absent, so running this against an up-to-date database is a
//! no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Connection pragmas for a file-backed database.
pub fn apply_file_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Connection pragmas for the in-memory engine.
pub fn apply_memory_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Bring the schema up to [`SCHEMA_VERSION`].
pub fn initialize(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema up to date (version {})", current_version);
        return Ok(());
    }

    info!(
        "Migrating schema from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    if current_version < 1 {
        create_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    info!("Schema ready (version {})", SCHEMA_VERSION);
    Ok(())
}

fn create_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS contexts (
            id TEXT PRIMARY KEY,
            project_path TEXT NOT NULL,
            type TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            importance INTEGER NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_contexts_timestamp
            ON contexts(timestamp);

        CREATE INDEX IF NOT EXISTS idx_contexts_project_path
            ON contexts(project_path);

        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            emoji TEXT,
            specializations TEXT NOT NULL DEFAULT '[]',
            color TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            is_custom INTEGER NOT NULL DEFAULT 0,
            prompt TEXT
        );

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Version 2: per-context embeddings for vector search.
fn migrate_v2(conn: &Connection) -> Result<()> {
    info!("Running schema migration v2: adding context_embeddings");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS context_embeddings (
            context_id TEXT PRIMARY KEY REFERENCES contexts(id) ON DELETE CASCADE,
            dimensions INTEGER NOT NULL,
            embedding BLOB NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Read a value from the `meta` table.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    let mut rows = stmt.query([key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Write a value to the `meta` table.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}
