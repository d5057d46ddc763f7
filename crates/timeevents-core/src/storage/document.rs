//! Document store contract for the local offline cache.
//!
//! Documents are JSON objects. A single physical store holds several
//! logical collections, told apart by the `module` field.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::DatabaseError;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Field holding the store-assigned document id.
pub const ID_FIELD: &str = "_id";

/// Field used as the logical collection discriminator.
pub const MODULE_FIELD: &str = "module";

/// Conjunction of field equality conditions.
///
/// A condition on a field the document does not carry never matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, Value)>,
}

impl Query {
    /// Query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query scoped to one logical collection.
    pub fn module(module: &str) -> Self {
        Self::new().eq(MODULE_FIELD, module)
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Value required for `field`, if the query constrains it.
    pub fn value_of(&self, field: &str) -> Option<&Value> {
        self.conditions
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether `doc` satisfies every condition.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// How an update changes the matched documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Overlay the listed fields, leave the rest untouched.
    Set(Document),
    /// Replace the whole body. The document id is kept.
    Replace(Document),
}

impl Modifier {
    /// Apply to `doc` in place.
    pub fn apply(&self, doc: &mut Document) {
        match self {
            Modifier::Set(fields) => {
                for (key, value) in fields {
                    if key != ID_FIELD {
                        doc.insert(key.clone(), value.clone());
                    }
                }
            }
            Modifier::Replace(body) => {
                let id = doc.remove(ID_FIELD);
                *doc = body.clone();
                doc.remove(ID_FIELD);
                if let Some(id) = id {
                    doc.insert(ID_FIELD.to_string(), id);
                }
            }
        }
    }

    /// Document an upsert inserts when nothing matched.
    fn upsert_body(&self, query: &Query) -> Document {
        let mut doc = Document::new();
        if let Modifier::Set(_) = self {
            for (field, value) in query.conditions() {
                doc.insert(field.clone(), value.clone());
            }
        }
        self.apply(&mut doc);
        doc
    }
}

/// Options for [`DocumentStore::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every match instead of only the first.
    pub multi: bool,
    /// Insert a document when nothing matched.
    pub upsert: bool,
}

/// Embedded document database used as the local cache.
///
/// Every operation reports store failures as [`DatabaseError`]; callers
/// decide whether a failure is fatal.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching `query`.
    async fn find(&self, query: &Query) -> Result<Vec<Document>, DatabaseError>;

    /// First document matching `query`.
    async fn find_one(&self, query: &Query) -> Result<Option<Document>, DatabaseError>;

    /// Store `doc`, assigning an `_id` when it has none. Returns the stored document.
    async fn insert(&self, doc: Document) -> Result<Document, DatabaseError>;

    /// Apply `modifier` to matching documents. Returns how many were changed or inserted.
    async fn update(
        &self,
        query: &Query,
        modifier: Modifier,
        options: UpdateOptions,
    ) -> Result<usize, DatabaseError>;

    /// Delete matching documents (only the first unless `multi`). Returns how many.
    async fn remove(&self, query: &Query, multi: bool) -> Result<usize, DatabaseError>;
}

/// Return `doc` with an `_id`, generating one if needed.
pub(crate) fn with_id(mut doc: Document) -> (String, Document) {
    let id = match doc.get(ID_FIELD).and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
    };
    (id, doc)
}

/// Body an upsert should insert for `query` + `modifier`.
pub(crate) fn upsert_document(query: &Query, modifier: &Modifier) -> Document {
    modifier.upsert_body(query)
}
