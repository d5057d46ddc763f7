//! Reconciliation of a remote time-event batch against the local cache.
//!
//! One pass walks the batch in order:
//! - Approved events are inserted once, keyed by (EmployeeID, EventDate, EventTime).
//! - Posted events are inserted, or flip an existing record to posted.
//! - Modified events (`Origin = "M"`) overwrite the record with the same ReqId.
//!
//! After every record has been applied, Posted records whose ReqId is
//! no longer in the batch are deleted. Store failures are logged and
//! skipped; a pass never aborts.

use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::storage::document::{ID_FIELD, MODULE_FIELD};
use crate::storage::{Document, DocumentStore, Modifier, Query, UpdateOptions};
use crate::sync::types::{
    EventKey, LocalTimeEventRecord, ReconcileSummary, RemoteTimeEvent, STATUS_POSTED,
    TIME_EVENT_MODULE,
};

const FIELD_EMPLOYEE_ID: &str = "EmployeeID";
const FIELD_EVENT_DATE: &str = "EventDate";
const FIELD_EVENT_TIME: &str = "EventTime";
const FIELD_STATUS_TEXT: &str = "StatusText";
const FIELD_STATUS: &str = "Status";
const FIELD_REQ_ID: &str = "ReqId";
const FIELD_IS_POSTED: &str = "isPosted";

/// Brings the local cache into agreement with a remote batch.
pub struct SyncReconciler<S: DocumentStore + ?Sized> {
    store: Arc<S>,
}

impl<S: DocumentStore + ?Sized> SyncReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one reconciliation pass over `remote`.
    ///
    /// Records are applied one after another, each store call awaited
    /// before the next starts, so records sharing a key never race. The
    /// stale-record scan runs only after every record was applied.
    pub async fn reconcile(&self, remote: &[RemoteTimeEvent]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for record in remote {
            if record.is_approved() || record.is_posted() {
                match record.key() {
                    Some(key) if record.is_approved() => {
                        self.apply_approved(record, &key, &mut summary).await
                    }
                    Some(key) => self.apply_posted(record, &key, &mut summary).await,
                    None => {
                        tracing::debug!(
                            req_id = ?record.req_id(),
                            "skipping time event without full key"
                        );
                        summary.skipped += 1;
                    }
                }
            }

            if record.is_modified() {
                self.apply_modified(record, &mut summary).await;
            }
        }

        self.prune_stale(remote, &mut summary).await;

        tracing::info!(
            batch = remote.len(),
            inserted = summary.inserted,
            posted = summary.posted,
            merged = summary.merged,
            deleted = summary.deleted,
            skipped = summary.skipped,
            failures = summary.failures,
            "reconciliation pass finished"
        );
        summary
    }

    async fn apply_approved(
        &self,
        record: &RemoteTimeEvent,
        key: &EventKey,
        summary: &mut ReconcileSummary,
    ) {
        match self.store.find_one(&key_query(key)).await {
            Ok(Some(_)) => {}
            Ok(None) => self.insert(record, false, summary).await,
            Err(e) => {
                tracing::warn!(error = %e, employee_id = %key.employee_id, "lookup of approved event failed");
                summary.failures += 1;
            }
        }
    }

    async fn apply_posted(
        &self,
        record: &RemoteTimeEvent,
        key: &EventKey,
        summary: &mut ReconcileSummary,
    ) {
        let existing = match self.store.find_one(&key_query(key)).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(error = %e, employee_id = %key.employee_id, "lookup of posted event failed");
                summary.failures += 1;
                return;
            }
        };

        let Some(existing) = existing else {
            self.insert(record, true, summary).await;
            return;
        };

        if existing.get(FIELD_IS_POSTED).and_then(Value::as_bool) == Some(true) {
            return;
        }

        let mut fields = Document::new();
        let updates = [
            (FIELD_STATUS_TEXT, &record.status_text),
            (FIELD_STATUS, &record.status),
            (FIELD_REQ_ID, &record.req_id),
        ];
        for (field, value) in updates {
            if let Some(value) = value {
                fields.insert(field.to_string(), Value::String(value.clone()));
            }
        }
        fields.insert(FIELD_IS_POSTED.to_string(), Value::Bool(true));

        let target = document_query(&existing).unwrap_or_else(|| key_query(key));
        match self
            .store
            .update(&target, Modifier::Set(fields), UpdateOptions::default())
            .await
        {
            Ok(_) => summary.posted += 1,
            Err(e) => {
                tracing::warn!(error = %e, req_id = ?record.req_id(), "marking event posted failed");
                summary.failures += 1;
            }
        }
    }

    async fn apply_modified(&self, record: &RemoteTimeEvent, summary: &mut ReconcileSummary) {
        let Some(req_id) = record.req_id() else {
            return;
        };

        let query = Query::module(TIME_EVENT_MODULE).eq(FIELD_REQ_ID, req_id);
        let existing = match self.store.find_one(&query).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, req_id, "lookup of modified event failed");
                summary.failures += 1;
                return;
            }
        };

        let overlay = match record.fields() {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(error = %e, req_id, "modified event not serializable");
                summary.failures += 1;
                return;
            }
        };

        let target = document_query(&existing).unwrap_or(query);
        let mut merged = existing;
        merged.extend(overlay);

        match self
            .store
            .update(&target, Modifier::Replace(merged), UpdateOptions::default())
            .await
        {
            Ok(_) => summary.merged += 1,
            Err(e) => {
                tracing::warn!(error = %e, req_id, "overwriting modified event failed");
                summary.failures += 1;
            }
        }
    }

    /// Delete Posted records whose ReqId is absent from the batch.
    ///
    /// Records without a ReqId on either side never take part. Approved
    /// records are left alone even when they vanished remotely.
    async fn prune_stale(&self, remote: &[RemoteTimeEvent], summary: &mut ReconcileSummary) {
        let posted_query = Query::module(TIME_EVENT_MODULE).eq(FIELD_STATUS_TEXT, STATUS_POSTED);
        let local_posted = match self.store.find(&posted_query).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "loading posted events for pruning failed");
                summary.failures += 1;
                return;
            }
        };

        let remote_ids: HashSet<&str> = remote.iter().filter_map(RemoteTimeEvent::req_id).collect();
        let stale: BTreeSet<String> = local_posted
            .iter()
            .filter_map(|doc| doc.get(FIELD_REQ_ID).and_then(Value::as_str))
            .filter(|id| !id.is_empty() && !remote_ids.contains(id))
            .map(str::to_string)
            .collect();

        for req_id in stale {
            let query = Query::module(TIME_EVENT_MODULE).eq(FIELD_REQ_ID, req_id.as_str());
            match self.store.remove(&query, true).await {
                Ok(removed) => {
                    tracing::debug!(req_id = %req_id, removed, "pruned stale posted event");
                    summary.deleted += removed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, req_id = %req_id, "pruning stale event failed");
                    summary.failures += 1;
                }
            }
        }
    }

    async fn insert(&self, record: &RemoteTimeEvent, is_posted: bool, summary: &mut ReconcileSummary) {
        let doc = match LocalTimeEventRecord::from_remote(record, is_posted).to_document() {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "time event not serializable");
                summary.failures += 1;
                return;
            }
        };
        match self.store.insert(doc).await {
            Ok(_) => summary.inserted += 1,
            Err(e) => {
                tracing::warn!(error = %e, req_id = ?record.req_id(), "caching time event failed");
                summary.failures += 1;
            }
        }
    }
}

fn key_query(key: &EventKey) -> Query {
    Query::module(TIME_EVENT_MODULE)
        .eq(FIELD_EMPLOYEE_ID, key.employee_id.as_str())
        .eq(FIELD_EVENT_DATE, key.event_date.as_str())
        .eq(FIELD_EVENT_TIME, key.event_time.as_str())
}

/// Query pinning exactly `doc`, when it carries an id.
fn document_query(doc: &Document) -> Option<Query> {
    let id = doc.get(ID_FIELD)?.clone();
    let module = doc.get(MODULE_FIELD)?.clone();
    Some(Query::new().eq(MODULE_FIELD, module).eq(ID_FIELD, id))
}
