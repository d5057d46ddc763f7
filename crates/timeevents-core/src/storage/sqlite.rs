//! SQLite-backed document store.
//!
//! Provides the persistent offline cache: every logical collection is a
//! set of JSON documents in one `documents` table, discriminated by the
//! `module` field.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::data_dir;
use super::document::{
    upsert_document, with_id, Document, DocumentStore, Modifier, Query, UpdateOptions,
    MODULE_FIELD,
};
use super::migrations;
use crate::error::DatabaseError;

/// SQLite [`DocumentStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at `<data_dir>/timeevents.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("timeevents.db"))
    }

    /// Open the store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    /// Load candidate rows for `query`, pushing the module condition into SQL.
    ///
    /// Rows whose body does not decode are logged and left out, so one
    /// damaged document never hides the rest of its module.
    fn load(conn: &Connection, query: &Query) -> Result<Vec<(String, Document)>, DatabaseError> {
        let rows: Vec<(String, String)> = match query.value_of(MODULE_FIELD) {
            Some(Value::String(module)) => {
                let mut stmt = conn.prepare(
                    "SELECT id, body FROM documents WHERE module = ?1 ORDER BY seq",
                )?;
                let rows = stmt.query_map(params![module], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<_, _>>()?
            }
            _ => {
                let mut stmt = conn.prepare("SELECT id, body FROM documents ORDER BY seq")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<_, _>>()?
            }
        };

        let mut docs = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            let doc = match decode(&id, &body) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable document");
                    continue;
                }
            };
            if query.matches(&doc) {
                docs.push((id, doc));
            }
        }
        Ok(docs)
    }
}

fn decode(id: &str, body: &str) -> Result<Document, DatabaseError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(DatabaseError::CorruptDocument {
            id: id.to_string(),
            message: "body is not a JSON object".to_string(),
        }),
        Err(e) => Err(DatabaseError::CorruptDocument {
            id: id.to_string(),
            message: e.to_string(),
        }),
    }
}

fn encode(doc: &Document) -> Result<String, DatabaseError> {
    serde_json::to_string(doc).map_err(|e| DatabaseError::InvalidDocument(e.to_string()))
}

fn module_of(doc: &Document) -> Option<&str> {
    doc.get(MODULE_FIELD).and_then(Value::as_str)
}

fn insert_row(conn: &Connection, id: &str, doc: &Document) -> Result<(), DatabaseError> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM documents WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    if existing.is_some() {
        return Err(DatabaseError::QueryFailed(format!("duplicate document id {id}")));
    }
    conn.execute(
        "INSERT INTO documents (id, module, body, seq)
         VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents))",
        params![id, module_of(doc), encode(doc)?],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find(&self, query: &Query) -> Result<Vec<Document>, DatabaseError> {
        let conn = self.conn()?;
        Ok(Self::load(&conn, query)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    async fn find_one(&self, query: &Query) -> Result<Option<Document>, DatabaseError> {
        let conn = self.conn()?;
        Ok(Self::load(&conn, query)?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    async fn insert(&self, doc: Document) -> Result<Document, DatabaseError> {
        let conn = self.conn()?;
        let (id, doc) = with_id(doc);
        insert_row(&conn, &id, &doc)?;
        Ok(doc)
    }

    async fn update(
        &self,
        query: &Query,
        modifier: Modifier,
        options: UpdateOptions,
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut targets = Self::load(&tx, query)?;
        if !options.multi {
            targets.truncate(1);
        }

        let mut changed = 0;
        for (id, mut doc) in targets {
            modifier.apply(&mut doc);
            tx.execute(
                "UPDATE documents SET module = ?1, body = ?2 WHERE id = ?3",
                params![module_of(&doc), encode(&doc)?, id],
            )?;
            changed += 1;
        }

        if changed == 0 && options.upsert {
            let (id, doc) = with_id(upsert_document(query, &modifier));
            insert_row(&tx, &id, &doc)?;
            changed = 1;
        }

        tx.commit()?;
        Ok(changed)
    }

    async fn remove(&self, query: &Query, multi: bool) -> Result<usize, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut targets = Self::load(&tx, query)?;
        if !multi {
            targets.truncate(1);
        }

        let mut removed = 0;
        for (id, _) in &targets {
            removed += tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        }

        tx.commit()?;
        Ok(removed)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}
