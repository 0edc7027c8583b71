//! Embedding storage and cosine-similarity search.
//!
//! Embeddings are stored as raw `f32` bytes in native byte order, tagged
//! with their width. Search only considers rows whose width matches the
//! configured dimensions.

use rusqlite::{Connection, params};
use tracing::debug;
use zerocopy::IntoBytes;

use ctxvault_types::SimilarityMatch;

use crate::error::{Result, StorageError};

use super::context_ops::context_exists;

/// Store (or replace) the embedding for a context.
pub fn store_embedding(
    conn: &Connection,
    dimensions: usize,
    context_id: &str,
    embedding: &[f32],
) -> Result<()> {
    check_dimensions(dimensions, embedding)?;
    if !context_exists(conn, context_id)? {
        return Err(StorageError::context_not_found(context_id));
    }

    conn.execute(
        "INSERT OR REPLACE INTO context_embeddings (context_id, dimensions, embedding)
         VALUES (?1, ?2, ?3)",
        params![context_id, dimensions as i64, embedding.as_bytes()],
    )?;

    debug!("Stored {}-dim embedding for context {}", dimensions, context_id);
    Ok(())
}

/// The `limit` closest contexts to `query`, best first.
pub fn search_similar(
    conn: &Connection,
    dimensions: usize,
    query: &[f32],
    limit: usize,
) -> Result<Vec<SimilarityMatch>> {
    check_dimensions(dimensions, query)?;

    let mut stmt = conn
        .prepare("SELECT context_id, embedding FROM context_embeddings WHERE dimensions = ?1")?;
    let mut rows = stmt.query(params![dimensions as i64])?;

    let mut matches = Vec::new();
    while let Some(row) = rows.next()? {
        let context_id: String = row.get(0)?;
        let bytes: Vec<u8> = row.get(1)?;
        let stored = decode_embedding(&bytes)?;
        if let Some(score) = cosine_similarity(query, &stored) {
            matches.push(SimilarityMatch { context_id, score });
        }
    }

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(limit);
    Ok(matches)
}

/// Embeddings stored with a width other than `dimensions`.
pub fn count_mismatched(conn: &Connection, dimensions: usize) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM context_embeddings WHERE dimensions != ?1",
        params![dimensions as i64],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn check_dimensions(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(StorageError::InvalidData(format!(
            "embedding has {} dimensions, expected {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::InvalidData(format!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// `None` when either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::{context_ops, schema};
    use ctxvault_types::{ContextEntry, ContextType, NewContext, new_id, now};

    fn conn_with(ids: usize) -> (Connection, Vec<String>) {
        let conn = Connection::open_in_memory().unwrap();
        schema::apply_memory_pragmas(&conn).unwrap();
        schema::initialize(&conn).unwrap();
        let ids = (0..ids)
            .map(|i| {
                let entry = ContextEntry::from_new(
                    new_id(),
                    now(),
                    NewContext::new("/p", ContextType::Note, format!("{i}")),
                );
                context_ops::insert_context(&conn, &entry).unwrap();
                entry.id
            })
            .collect();
        (conn, ids)
    }

    #[test]
    fn test_ranking() {
        let (conn, ids) = conn_with(3);
        store_embedding(&conn, 3, &ids[0], &[1.0, 0.0, 0.0]).unwrap();
        store_embedding(&conn, 3, &ids[1], &[0.7, 0.7, 0.0]).unwrap();
        store_embedding(&conn, 3, &ids[2], &[0.0, 0.0, 1.0]).unwrap();

        let hits = search_similar(&conn, 3, &[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].context_id, ids[0]);
        assert_eq!(hits[1].context_id, ids[1]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_dimension_and_target_checks() {
        let (conn, ids) = conn_with(1);
        assert!(matches!(
            store_embedding(&conn, 3, &ids[0], &[1.0, 0.0]),
            Err(StorageError::InvalidData(_))
        ));
        assert!(matches!(
            store_embedding(&conn, 2, "missing", &[1.0, 0.0]),
            Err(StorageError::NotFound { .. })
        ));
        assert!(search_similar(&conn, 3, &[1.0], 5).is_err());
    }

    #[test]
    fn test_embedding_removed_with_context() {
        let (conn, ids) = conn_with(1);
        store_embedding(&conn, 2, &ids[0], &[1.0, 1.0]).unwrap();
        context_ops::delete_context(&conn, &ids[0]).unwrap();
        assert!(search_similar(&conn, 2, &[1.0, 1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_widths_are_ignored() {
        let (conn, ids) = conn_with(2);
        store_embedding(&conn, 2, &ids[0], &[1.0, 0.0]).unwrap();
        store_embedding(&conn, 3, &ids[1], &[1.0, 0.0, 0.0]).unwrap();

        assert_eq!(count_mismatched(&conn, 3).unwrap(), 1);
        let hits = search_similar(&conn, 3, &[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].context_id, ids[1]);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        let same = cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((same - 1.0).abs() < 1e-6);
    }
}
