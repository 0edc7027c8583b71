//! Agent CRUD and seeding.

use rusqlite::{Connection, Row, ToSql, params};
use tracing::{debug, info};

use ctxvault_types::{AgentPatch, DatabaseAgent, seed_agents};

use crate::error::{Result, StorageError};

const AGENT_COLUMNS: &str =
    "id, name, description, emoji, specializations, color, enabled, is_custom, prompt";

pub fn insert_agent(conn: &Connection, agent: &DatabaseAgent) -> Result<()> {
    let specializations_json = serde_json::to_string(&agent.specializations)?;

    conn.execute(
        r#"
        INSERT INTO agents (id, name, description, emoji, specializations, color, enabled, is_custom, prompt)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            agent.id,
            agent.name,
            agent.description,
            agent.emoji,
            specializations_json,
            agent.color,
            agent.enabled,
            agent.is_custom,
            agent.prompt,
        ],
    )
    .map_err(|e| map_unique_name(e, &agent.name))?;

    debug!("Inserted agent {} ({})", agent.id, agent.name);
    Ok(())
}

pub fn get_agent(conn: &Connection, id: &str) -> Result<Option<DatabaseAgent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(row_to_agent(row)?)),
        None => Ok(None),
    }
}

/// Every agent, ordered by name.
pub fn list_agents(conn: &Connection) -> Result<Vec<DatabaseAgent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut agents = Vec::new();
    while let Some(row) = rows.next()? {
        agents.push(row_to_agent(row)?);
    }
    Ok(agents)
}

pub fn count_agents(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Apply the supplied fields of `patch`. `id` and `is_custom` are not patchable.
pub fn update_agent(conn: &Connection, id: &str, patch: &AgentPatch) -> Result<()> {
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        values.push(Box::new(name.clone()));
    }
    if let Some(description) = &patch.description {
        sets.push("description = ?");
        values.push(Box::new(description.clone()));
    }
    if let Some(emoji) = &patch.emoji {
        sets.push("emoji = ?");
        values.push(Box::new(emoji.clone()));
    }
    if let Some(specializations) = &patch.specializations {
        sets.push("specializations = ?");
        values.push(Box::new(serde_json::to_string(specializations)?));
    }
    if let Some(color) = &patch.color {
        sets.push("color = ?");
        values.push(Box::new(color.clone()));
    }
    if let Some(enabled) = patch.enabled {
        sets.push("enabled = ?");
        values.push(Box::new(enabled));
    }
    if let Some(prompt) = &patch.prompt {
        sets.push("prompt = ?");
        values.push(Box::new(prompt.clone()));
    }

    if sets.is_empty() {
        return match get_agent(conn, id)? {
            Some(_) => Ok(()),
            None => Err(StorageError::agent_not_found(id)),
        };
    }

    let sql = format!("UPDATE agents SET {} WHERE id = ?", sets.join(", "));
    values.push(Box::new(id.to_string()));

    let params_refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();
    let updated = conn
        .execute(&sql, params_refs.as_slice())
        .map_err(|e| map_unique_name(e, patch.name.as_deref().unwrap_or_default()))?;

    if updated == 0 {
        return Err(StorageError::agent_not_found(id));
    }
    debug!("Updated agent {} ({} fields)", id, sets.len());
    Ok(())
}

/// Delete a custom agent. Seed agents are refused before any delete is issued.
pub fn delete_agent(conn: &Connection, id: &str) -> Result<()> {
    let agent = get_agent(conn, id)?.ok_or_else(|| StorageError::agent_not_found(id))?;
    if !agent.is_custom {
        return Err(StorageError::Protected {
            entity: "agent",
            name: agent.name,
        });
    }

    conn.execute("DELETE FROM agents WHERE id = ?1", params![id])?;
    debug!("Deleted agent {} ({})", id, agent.name);
    Ok(())
}

/// Overwrite the row stored under `old_id` with `agent`, id included.
pub fn replace_agent(conn: &Connection, old_id: &str, agent: &DatabaseAgent) -> Result<()> {
    if agent.id != old_id {
        if let Some(existing) = get_agent(conn, &agent.id)? {
            return Err(StorageError::Protected {
                entity: "agent",
                name: existing.name,
            });
        }
    }
    let specializations_json = serde_json::to_string(&agent.specializations)?;

    let updated = conn
        .execute(
            r#"
            UPDATE agents
            SET id = ?1, name = ?2, description = ?3, emoji = ?4, specializations = ?5,
                color = ?6, enabled = ?7, is_custom = ?8, prompt = ?9
            WHERE id = ?10
            "#,
            params![
                agent.id,
                agent.name,
                agent.description,
                agent.emoji,
                specializations_json,
                agent.color,
                agent.enabled,
                agent.is_custom,
                agent.prompt,
                old_id,
            ],
        )
        .map_err(|e| map_unique_name(e, &agent.name))?;

    if updated == 0 {
        return Err(StorageError::agent_not_found(old_id));
    }
    debug!("Replaced agent {} with {} ({})", old_id, agent.id, agent.name);
    Ok(())
}

/// Install the canonical seed agents when the table is empty.
///
/// Returns the number of agents inserted.
pub fn seed_if_empty(conn: &Connection) -> Result<usize> {
    if count_agents(conn)? > 0 {
        return Ok(0);
    }
    let seeds = seed_agents();
    for agent in &seeds {
        insert_agent(conn, agent)?;
    }
    info!("Seeded {} canonical agents", seeds.len());
    Ok(seeds.len())
}

fn map_unique_name(err: rusqlite::Error, name: &str) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            return StorageError::duplicate_agent_name(name);
        }
    }
    StorageError::Database(err)
}

fn row_to_agent(row: &Row<'_>) -> Result<DatabaseAgent> {
    let specializations_json: String = row.get(4)?;

    Ok(DatabaseAgent {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        emoji: row.get(3)?,
        specializations: serde_json::from_str(&specializations_json)?,
        color: row.get(5)?,
        enabled: row.get(6)?,
        is_custom: row.get(7)?,
        prompt: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::schema;
    use ctxvault_types::{NewAgent, new_id};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn test_seed_only_when_empty() {
        let conn = conn();
        assert_eq!(seed_if_empty(&conn).unwrap(), 3);
        assert_eq!(seed_if_empty(&conn).unwrap(), 0);
        assert_eq!(count_agents(&conn).unwrap(), 3);
    }

    #[test]
    fn test_roundtrip_and_ordering() {
        let conn = conn();
        let agent = NewAgent::custom("Zed", "Last by name")
            .with_emoji("Z")
            .with_specialization("sorting")
            .into_agent(new_id());
        insert_agent(&conn, &agent).unwrap();
        insert_agent(
            &conn,
            &NewAgent::custom("Alpha", "First by name").into_agent(new_id()),
        )
        .unwrap();

        assert_eq!(get_agent(&conn, &agent.id).unwrap(), Some(agent));
        let names: Vec<_> = list_agents(&conn)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Alpha".to_string(), "Zed".to_string()]);
    }

    #[test]
    fn test_unique_name_is_conflict() {
        let conn = conn();
        insert_agent(&conn, &NewAgent::custom("Docs", "a").into_agent(new_id())).unwrap();
        let other = NewAgent::custom("Other", "b").into_agent(new_id());
        insert_agent(&conn, &other).unwrap();

        assert!(matches!(
            insert_agent(&conn, &NewAgent::custom("Docs", "c").into_agent(new_id())),
            Err(StorageError::Conflict(_))
        ));

        let rename = AgentPatch {
            name: Some("Docs".to_string()),
            ..AgentPatch::default()
        };
        assert!(matches!(
            update_agent(&conn, &other.id, &rename),
            Err(StorageError::Conflict(_))
        ));
    }

    #[test]
    fn test_delete_checks_custom_flag() {
        let conn = conn();
        seed_if_empty(&conn).unwrap();
        let seed = list_agents(&conn).unwrap().remove(0);
        assert!(matches!(
            delete_agent(&conn, &seed.id),
            Err(StorageError::Protected { .. })
        ));
        assert!(get_agent(&conn, &seed.id).unwrap().is_some());

        let custom = NewAgent::custom("Docs", "d").into_agent(new_id());
        insert_agent(&conn, &custom).unwrap();
        delete_agent(&conn, &custom.id).unwrap();
        assert!(matches!(
            delete_agent(&conn, &custom.id),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_replace_rewrites_identity() {
        let conn = conn();
        seed_if_empty(&conn).unwrap();
        let seed = list_agents(&conn).unwrap().remove(0);

        let mut replacement = seed.clone();
        replacement.id = "agent-architect".to_string();
        replacement.enabled = false;
        replace_agent(&conn, &seed.id, &replacement).unwrap();

        assert!(get_agent(&conn, &seed.id).unwrap().is_none());
        assert_eq!(
            get_agent(&conn, "agent-architect").unwrap(),
            Some(replacement.clone())
        );
        assert_eq!(count_agents(&conn).unwrap(), 3);

        let other = list_agents(&conn)
            .unwrap()
            .into_iter()
            .find(|a| a.id != replacement.id)
            .unwrap();
        assert!(matches!(
            replace_agent(&conn, &other.id, &replacement),
            Err(StorageError::Protected { .. })
        ));
        assert!(matches!(
            replace_agent(&conn, "missing", &NewAgent::custom("X", "x").into_agent(new_id())),
            Err(StorageError::NotFound { .. })
        ));
    }
}
