//! Document repository: reads and writes for the `documents` status table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw document row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    pub document_key: String,
    pub status: String,
    /// JSON-encoded error detail.
    pub error: Option<String>,
    pub run_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            document_key: row.get("document_key")?,
            status: row.get("status")?,
            error: row.get("error")?,
            run_id: row.get("run_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal(&self.status)
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWrite {
    Written,
    /// The write was refused; the row that blocked it is returned unchanged.
    Kept(DocumentRow),
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "complete" | "error")
}

fn select(conn: &Connection, key: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM documents WHERE document_key = ?1",
            params![key],
            DocumentRow::from_row,
        )
        .optional()?;
    Ok(row)
}

fn write(conn: &Connection, row: &DocumentRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (document_key, status, error, run_id, created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(document_key) DO UPDATE SET
            status = excluded.status,
            error = excluded.error,
            run_id = COALESCE(excluded.run_id, documents.run_id),
            updated_at = excluded.updated_at,
            completed_at = excluded.completed_at",
        params![
            row.document_key,
            row.status,
            row.error,
            row.run_id,
            row.created_at,
            row.updated_at,
            row.completed_at,
        ],
    )?;
    Ok(())
}

/// Finds a document by its key.
pub fn find_by_key(db: &Database, key: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| select(conn, key))
}

/// Inserts or overwrites a document row. `created_at` of an existing row is
/// preserved.
pub fn upsert(db: &Database, row: &DocumentRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| write(conn, row))
}

/// Writes `row` unless the stored row is already terminal.
///
/// The read and the write happen under one connection lock.
pub fn upsert_unless_terminal(
    db: &Database,
    row: &DocumentRow,
) -> Result<ConditionalWrite, DatabaseError> {
    db.with_conn(|conn| match select(conn, &row.document_key)? {
        Some(existing) if existing.is_terminal() => Ok(ConditionalWrite::Kept(existing)),
        _ => {
            write(conn, row)?;
            Ok(ConditionalWrite::Written)
        }
    })
}
