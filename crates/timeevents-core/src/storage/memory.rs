//! Volatile in-memory document store.
//!
//! Mirrors [`SqliteStore`](super::SqliteStore) semantics without touching
//! disk. Tests can arm one-shot failures per operation to exercise the
//! error paths of store consumers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::document::{upsert_document, with_id, Document, DocumentStore, Modifier, Query, UpdateOptions};
use crate::error::DatabaseError;

/// Store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Find,
    FindOne,
    Insert,
    Update,
    Remove,
}

#[derive(Default)]
struct Inner {
    docs: Vec<Document>,
    failures: HashMap<StoreOp, usize>,
}

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `docs` (ids assigned where missing).
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner.docs = docs.into_iter().map(|doc| with_id(doc).1).collect();
        }
        store
    }

    /// Make the next call to `op` fail.
    pub fn fail_next(&self, op: StoreOp) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.failures.entry(op).or_insert(0) += 1;
        }
    }

    /// Snapshot of every stored document.
    pub fn documents(&self) -> Vec<Document> {
        self.inner
            .lock()
            .map(|inner| inner.docs.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self, op: StoreOp) -> Result<MutexGuard<'_, Inner>, DatabaseError> {
        let mut inner = self.inner.lock().map_err(|_| DatabaseError::Poisoned)?;
        if let Some(remaining) = inner.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DatabaseError::QueryFailed(format!(
                    "injected {op:?} failure"
                )));
            }
        }
        Ok(inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, query: &Query) -> Result<Vec<Document>, DatabaseError> {
        let inner = self.begin(StoreOp::Find)?;
        Ok(inner
            .docs
            .iter()
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect())
    }

    async fn find_one(&self, query: &Query) -> Result<Option<Document>, DatabaseError> {
        let inner = self.begin(StoreOp::FindOne)?;
        Ok(inner.docs.iter().find(|doc| query.matches(doc)).cloned())
    }

    async fn insert(&self, doc: Document) -> Result<Document, DatabaseError> {
        let mut inner = self.begin(StoreOp::Insert)?;
        let (id, doc) = with_id(doc);
        if inner
            .docs
            .iter()
            .any(|existing| existing.get("_id").and_then(|v| v.as_str()) == Some(id.as_str()))
        {
            return Err(DatabaseError::QueryFailed(format!(
                "duplicate document id {id}"
            )));
        }
        inner.docs.push(doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        query: &Query,
        modifier: Modifier,
        options: UpdateOptions,
    ) -> Result<usize, DatabaseError> {
        let mut inner = self.begin(StoreOp::Update)?;
        let mut changed = 0;
        for doc in inner.docs.iter_mut().filter(|doc| query.matches(doc)) {
            modifier.apply(doc);
            changed += 1;
            if !options.multi {
                break;
            }
        }
        if changed == 0 && options.upsert {
            let (_, doc) = with_id(upsert_document(query, &modifier));
            inner.docs.push(doc);
            changed = 1;
        }
        Ok(changed)
    }

    async fn remove(&self, query: &Query, multi: bool) -> Result<usize, DatabaseError> {
        let mut inner = self.begin(StoreOp::Remove)?;
        let before = inner.docs.len();
        if multi {
            inner.docs.retain(|doc| !query.matches(doc));
        } else if let Some(pos) = inner.docs.iter().position(|doc| query.matches(doc)) {
            inner.docs.remove(pos);
        }
        Ok(before - inner.docs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_find_matches() {
        let store = MemoryStore::new();
        let stored = store.insert(doc(json!({"module": "A", "n": 1}))).await.unwrap();
        assert!(stored.contains_key("_id"));

        let found = store.find(&Query::module("A")).await.unwrap();
        assert_eq!(found, vec![stored]);
        assert!(store.find_one(&Query::module("B")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_single_touches_first_match_only() {
        let store = MemoryStore::with_documents([
            doc(json!({"module": "A", "n": 1})),
            doc(json!({"module": "A", "n": 2})),
        ]);
        let changed = store
            .update(
                &Query::module("A"),
                Modifier::Set(doc(json!({"flag": true}))),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let flagged = store.find(&Query::new().eq("flag", true)).await.unwrap();
        assert_eq!(flagged.len(), 1);
    }

    #[tokio::test]
    async fn upsert_inserts_when_nothing_matches() {
        let store = MemoryStore::new();
        let changed = store
            .update(
                &Query::module("SyncState"),
                Modifier::Set(doc(json!({"count": 3}))),
                UpdateOptions { multi: false, upsert: true },
            )
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let stored = store.find_one(&Query::module("SyncState")).await.unwrap().unwrap();
        assert_eq!(stored["count"], 3);
    }

    #[tokio::test]
    async fn remove_multi_and_single() {
        let store = MemoryStore::with_documents([
            doc(json!({"module": "A"})),
            doc(json!({"module": "A"})),
            doc(json!({"module": "B"})),
        ]);
        assert_eq!(store.remove(&Query::module("A"), false).await.unwrap(), 1);
        assert_eq!(store.remove(&Query::module("A"), true).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Insert);
        assert!(store.insert(Document::new()).await.is_err());
        assert!(store.insert(Document::new()).await.is_ok());
        assert_eq!(store.len(), 1);
    }
}
