//! Context CRUD, filtered listing and grouped counts.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use tracing::debug;

use ctxvault_types::{
    BackendKind, ContextEntry, ContextPatch, ContextType, DatabaseStats, SearchOptions,
    StatsFilter,
};

use crate::error::{Result, StorageError};

use super::{decode_timestamp, encode_timestamp};

const CONTEXT_COLUMNS: &str = "id, project_path, type, content, timestamp, importance, tags";

/// Insert a fully materialized entry.
pub fn insert_context(conn: &Connection, entry: &ContextEntry) -> Result<()> {
    let tags_json = serde_json::to_string(&entry.tags)?;

    conn.execute(
        r#"
        INSERT INTO contexts (id, project_path, type, content, timestamp, importance, tags)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            entry.id,
            entry.project_path,
            entry.context_type.as_str(),
            entry.content,
            encode_timestamp(&entry.timestamp),
            entry.importance,
            tags_json,
        ],
    )?;

    debug!("Inserted context {}", entry.id);
    Ok(())
}

pub fn context_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM contexts WHERE id = ?1", params![id], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn get_context(conn: &Connection, id: &str) -> Result<Option<ContextEntry>> {
    let sql = format!("SELECT {CONTEXT_COLUMNS} FROM contexts WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(row_to_context(row)?)),
        None => Ok(None),
    }
}

/// Filtered entries ordered newest first, with `LIMIT`/`OFFSET` applied last.
pub fn list_contexts(conn: &Connection, options: &SearchOptions) -> Result<Vec<ContextEntry>> {
    let (where_clause, mut values) = filter_clause(options);
    let sql = format!(
        "SELECT {CONTEXT_COLUMNS} FROM contexts{where_clause} \
         ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?"
    );
    // SQLite treats a negative limit as "no limit".
    values.push(Box::new(options.limit.map(|l| l as i64).unwrap_or(-1)));
    values.push(Box::new(options.offset as i64));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();
    let mut rows = stmt.query(params_refs.as_slice())?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(row_to_context(row)?);
    }
    Ok(entries)
}

/// Apply the supplied fields of `patch`. Unset fields are never written.
pub fn update_context(conn: &Connection, id: &str, patch: &ContextPatch) -> Result<()> {
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(project_path) = &patch.project_path {
        sets.push("project_path = ?");
        values.push(Box::new(project_path.clone()));
    }
    if let Some(context_type) = patch.context_type {
        sets.push("type = ?");
        values.push(Box::new(context_type.as_str()));
    }
    if let Some(content) = &patch.content {
        sets.push("content = ?");
        values.push(Box::new(content.clone()));
    }
    if let Some(importance) = patch.importance {
        sets.push("importance = ?");
        values.push(Box::new(importance));
    }
    if let Some(tags) = &patch.tags {
        sets.push("tags = ?");
        values.push(Box::new(serde_json::to_string(tags)?));
    }

    if sets.is_empty() {
        return if context_exists(conn, id)? {
            Ok(())
        } else {
            Err(StorageError::context_not_found(id))
        };
    }

    let sql = format!("UPDATE contexts SET {} WHERE id = ?", sets.join(", "));
    values.push(Box::new(id.to_string()));

    let params_refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();
    let updated = conn.execute(&sql, params_refs.as_slice())?;

    if updated == 0 {
        return Err(StorageError::context_not_found(id));
    }
    debug!("Updated context {} ({} fields)", id, sets.len());
    Ok(())
}

pub fn delete_context(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute("DELETE FROM contexts WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(StorageError::context_not_found(id));
    }
    debug!("Deleted context {}", id);
    Ok(())
}

/// Context counts: one `GROUP BY` per dimension.
pub fn context_stats(
    conn: &Connection,
    adapter: BackendKind,
    filter: Option<&StatsFilter>,
    total_agents: usize,
) -> Result<DatabaseStats> {
    let options = SearchOptions {
        project_path: filter.and_then(|f| f.project_path.clone()),
        context_type: filter.and_then(|f| f.context_type),
        ..SearchOptions::default()
    };

    let by_type = grouped_counts(conn, "type", &options)?;
    let by_project = grouped_counts(conn, "project_path", &options)?;
    let total_contexts = by_type.values().sum();

    Ok(DatabaseStats {
        total_contexts,
        total_agents,
        by_type,
        by_project,
        storage_size_bytes: None,
        last_sync: None,
        adapter,
    })
}

fn grouped_counts(
    conn: &Connection,
    column: &'static str,
    options: &SearchOptions,
) -> Result<BTreeMap<String, usize>> {
    let (where_clause, values) = filter_clause(options);
    let sql = format!("SELECT {column}, COUNT(*) FROM contexts{where_clause} GROUP BY {column}");

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();
    let mut rows = stmt.query(params_refs.as_slice())?;

    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        counts.insert(key, count as usize);
    }
    Ok(counts)
}

/// `AND`-joined predicates for every populated filter, with bound values.
fn filter_clause(options: &SearchOptions) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(project_path) = &options.project_path {
        clauses.push("project_path = ?".to_string());
        values.push(Box::new(project_path.clone()));
    }
    if let Some(context_type) = options.context_type {
        clauses.push("type = ?".to_string());
        values.push(Box::new(context_type.as_str()));
    }
    if let Some(floor) = options.min_importance {
        clauses.push("importance >= ?".to_string());
        values.push(Box::new(floor));
    }
    if !options.tags.is_empty() {
        let placeholders = vec!["?"; options.tags.len()].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(contexts.tags) WHERE json_each.value IN ({placeholders}))"
        ));
        for tag in &options.tags {
            values.push(Box::new(tag.clone()));
        }
    }
    if let Some(query) = options.effective_query() {
        let pattern = like_pattern(query);
        clauses.push(
            "(content LIKE ? ESCAPE '\\' OR EXISTS (SELECT 1 FROM json_each(contexts.tags) \
             WHERE json_each.value LIKE ? ESCAPE '\\'))"
                .to_string(),
        );
        values.push(Box::new(pattern.clone()));
        values.push(Box::new(pattern));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

/// `%query%` with LIKE wildcards in `query` escaped.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn row_to_context(row: &Row<'_>) -> Result<ContextEntry> {
    let id: String = row.get(0)?;
    let type_str: String = row.get(2)?;
    let timestamp_str: String = row.get(4)?;
    let importance: i64 = row.get(5)?;
    let tags_json: String = row.get(6)?;

    let context_type: ContextType = type_str.parse()?;
    let importance = u8::try_from(importance).map_err(|_| {
        StorageError::InvalidData(format!("context {id} has importance {importance}"))
    })?;

    Ok(ContextEntry {
        project_path: row.get(1)?,
        context_type,
        content: row.get(3)?,
        timestamp: decode_timestamp(&timestamp_str)?,
        importance,
        tags: serde_json::from_str(&tags_json)?,
        id,
    })
}
