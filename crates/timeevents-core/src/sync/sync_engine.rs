//! Sync engine: fetch the remote feed, reconcile, record status.

use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{CoreError, DatabaseError, ValidationError};
use crate::storage::{Document, DocumentStore, Modifier, Query, UpdateOptions};
use crate::sync::odata_client::RemoteFeed;
use crate::sync::reconciler::SyncReconciler;
use crate::sync::types::{
    LocalTimeEventRecord, ReconcileSummary, RemoteTimeEvent, SyncStatus, SYNC_STATE_MODULE,
    TIME_EVENT_MODULE,
};

/// Sync engine over a remote feed and the local cache.
pub struct SyncEngine<S: DocumentStore + ?Sized, F: RemoteFeed + ?Sized> {
    feed: Arc<F>,
    reconciler: SyncReconciler<S>,
}

impl<S: DocumentStore + ?Sized, F: RemoteFeed + ?Sized> SyncEngine<S, F> {
    pub fn new(store: Arc<S>, feed: Arc<F>) -> Self {
        Self {
            feed,
            reconciler: SyncReconciler::new(store),
        }
    }

    fn store(&self) -> &S {
        self.reconciler.store()
    }

    /// Fetch one employee's events in `from..=to` and reconcile them.
    ///
    /// A failed fetch leaves the cache untouched; the failure is recorded
    /// in the persisted status and returned.
    pub async fn sync_window(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ReconcileSummary, CoreError> {
        if to < from {
            return Err(ValidationError::InvalidDateRange { from, to }.into());
        }

        let mut status = self.status().await.unwrap_or_default();
        status.in_progress = true;
        status.last_attempt_at = Some(Utc::now());
        self.save_status(&status).await?;

        tracing::info!(employee_id, %from, %to, "starting sync");
        let remote = match self.feed.fetch_time_events(employee_id, from, to).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(error = %e, employee_id, "fetching remote time events failed");
                status.in_progress = false;
                status.last_error = Some(e.to_string());
                self.save_status(&status).await?;
                return Err(e.into());
            }
        };

        let summary = self.apply_batch(&remote).await;

        status.in_progress = false;
        status.last_sync_at = Some(Utc::now());
        status.last_error = None;
        status.fetched_count = remote.len();
        status.last_summary = summary;
        self.save_status(&status).await?;

        Ok(summary)
    }

    /// Sync the `days` days ending today.
    pub async fn sync_recent(
        &self,
        employee_id: &str,
        days: u32,
    ) -> Result<ReconcileSummary, CoreError> {
        let to = Utc::now().date_naive();
        let from = to
            .checked_sub_signed(Duration::days(i64::from(days.max(1)) - 1))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "days".to_string(),
                message: format!("{days} days reaches before the earliest supported date"),
            })?;
        self.sync_window(employee_id, from, to).await
    }

    /// Reconcile an already fetched batch (e.g. a saved feed response).
    pub async fn apply_batch(&self, remote: &[RemoteTimeEvent]) -> ReconcileSummary {
        self.reconciler.reconcile(remote).await
    }

    /// Persisted status of the last sync.
    pub async fn status(&self) -> Result<SyncStatus, DatabaseError> {
        let Some(mut doc) = self.store().find_one(&Query::module(SYNC_STATE_MODULE)).await? else {
            return Ok(SyncStatus::default());
        };
        doc.remove("_id");
        doc.remove("module");
        serde_json::from_value(Value::Object(doc)).map_err(|e| DatabaseError::CorruptDocument {
            id: SYNC_STATE_MODULE.to_string(),
            message: e.to_string(),
        })
    }

    async fn save_status(&self, status: &SyncStatus) -> Result<(), DatabaseError> {
        let fields = match serde_json::to_value(status) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Document::new(),
            Err(e) => return Err(DatabaseError::InvalidDocument(e.to_string())),
        };
        self.store()
            .update(
                &Query::module(SYNC_STATE_MODULE),
                Modifier::Set(fields),
                UpdateOptions {
                    multi: false,
                    upsert: true,
                },
            )
            .await?;
        Ok(())
    }

    /// Cached events of one employee, ordered by date and time.
    pub async fn cached_events(
        &self,
        employee_id: Option<&str>,
    ) -> Result<Vec<LocalTimeEventRecord>, DatabaseError> {
        let mut query = Query::module(TIME_EVENT_MODULE);
        if let Some(employee_id) = employee_id {
            query = query.eq("EmployeeID", employee_id);
        }
        let mut records = self
            .store()
            .find(&query)
            .await?
            .iter()
            .map(LocalTimeEventRecord::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| {
            (&a.event.event_date, &a.event.event_time).cmp(&(&b.event.event_date, &b.event.event_time))
        });
        Ok(records)
    }
}
