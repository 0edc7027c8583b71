//! File round-tripping for the in-memory engine.
//!
//! The working database lives in memory. On connect the file's rows are
//! copied in through `ATTACH`; after every mutation the whole database is
//! written out with `VACUUM INTO` a temporary sibling, synced, and renamed
//! over the file. A mutation whose write-out fails is undone from a
//! [`snapshot`] taken before it ran.

use std::path::Path;
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::persist;

/// Tables copied from the file, with their column lists.
const COPIED_TABLES: [(&str, &str); 4] = [
    (
        "contexts",
        "id, project_path, type, content, timestamp, importance, tags",
    ),
    (
        "agents",
        "id, name, description, emoji, specializations, color, enabled, is_custom, prompt",
    ),
    ("meta", "key, value"),
    ("context_embeddings", "context_id, dimensions, embedding"),
];

/// Copy every row of the database file at `path` into `conn`.
///
/// `conn` must already carry the current schema. Tables absent from the
/// file are skipped. Returns the number of rows copied.
pub fn load_from_file(conn: &Connection, path: &Path) -> Result<usize> {
    let path_str = path.to_string_lossy();
    conn.execute("ATTACH DATABASE ?1 AS disk", params![path_str.as_ref()])?;

    let copied = copy_tables(conn);
    conn.execute_batch("DETACH DATABASE disk")?;
    let copied = copied?;

    info!(path = %path.display(), rows = copied, "Loaded embedded database");
    Ok(copied)
}

fn copy_tables(conn: &Connection) -> Result<usize> {
    let mut copied = 0;
    for (table, columns) in COPIED_TABLES {
        let present: i64 = conn.query_row(
            "SELECT COUNT(*) FROM disk.sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        if present == 0 {
            debug!("Embedded file has no {} table", table);
            continue;
        }
        let sql = format!(
            "INSERT OR REPLACE INTO main.{table} ({columns}) SELECT {columns} FROM disk.{table}"
        );
        copied += conn.execute(&sql, [])?;
    }
    Ok(copied)
}

/// Serialize the whole in-memory database to `path` atomically.
pub fn persist_to_file(conn: &Connection, path: &Path) -> Result<()> {
    let temp = persist::temp_sibling(path);
    match std::fs::remove_file(&temp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StorageError::Io(e)),
    }

    let temp_str = temp.to_string_lossy();
    conn.execute("VACUUM INTO ?1", params![temp_str.as_ref()])?;
    std::fs::File::open(&temp)?.sync_all()?;
    std::fs::rename(&temp, path)?;

    debug!(path = %path.display(), "Persisted embedded database");
    Ok(())
}

const BACKUP_PAGES_PER_STEP: i32 = 1024;

/// Copy the whole database into a fresh in-memory connection.
pub fn snapshot(conn: &Connection) -> Result<Connection> {
    let mut copy = Connection::open_in_memory()?;
    Backup::new(conn, &mut copy)?.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
    Ok(copy)
}

/// Overwrite `conn` with the contents of a [`snapshot`].
pub fn restore(conn: &mut Connection, snapshot: &Connection) -> Result<()> {
    Backup::new(snapshot, conn)?.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
    debug!("Restored embedded database from snapshot");
    Ok(())
}
