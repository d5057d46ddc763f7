//! Core types for time-event synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DatabaseError;
use crate::storage::Document;

/// Discriminator of cached time events inside the shared local store.
pub const TIME_EVENT_MODULE: &str = "TimeEventSetIndividual";

/// Discriminator of the persisted [`SyncStatus`] document.
pub const SYNC_STATE_MODULE: &str = "SyncState";

pub const STATUS_APPROVED: &str = "Approved";
pub const STATUS_POSTED: &str = "Posted";

/// `Origin` flag of a record modified on the backend.
pub const ORIGIN_MODIFIED: &str = "M";

/// Fields owned by the local cache. A feed value for them is ignored.
pub const LOCAL_FIELDS: [&str; 4] = ["_id", "module", "isSynced", "isPosted"];

/// Identity of a time event inside the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub employee_id: String,
    pub event_date: String,
    pub event_time: String,
}

/// A time event as delivered by the OData feed.
///
/// Fields the feed omits stay `None` and are not serialized, so the
/// set of fields "present on the record" survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteTimeEvent {
    #[serde(rename = "EmployeeID", default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(rename = "EventDate", default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(rename = "EventTime", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    #[serde(rename = "StatusText", default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "ReqId", default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(rename = "Origin", default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Any other feed fields, copied verbatim into the cache.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteTimeEvent {
    /// Request id, treating an empty string as unassigned.
    pub fn req_id(&self) -> Option<&str> {
        self.req_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Key tuple, if all three key fields are present.
    pub fn key(&self) -> Option<EventKey> {
        Some(EventKey {
            employee_id: self.employee_id.clone()?,
            event_date: self.event_date.clone()?,
            event_time: self.event_time.clone()?,
        })
    }

    pub fn is_approved(&self) -> bool {
        self.status_text.as_deref() == Some(STATUS_APPROVED)
    }

    pub fn is_posted(&self) -> bool {
        self.status_text.as_deref() == Some(STATUS_POSTED)
    }

    pub fn is_modified(&self) -> bool {
        self.origin.as_deref() == Some(ORIGIN_MODIFIED)
    }

    /// Every field present on the record, as a document, minus [`LOCAL_FIELDS`].
    pub fn fields(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self.without_local_fields())? {
            Value::Object(map) => Ok(map),
            _ => Ok(Document::new()),
        }
    }

    /// Copy with any [`LOCAL_FIELDS`] dropped from `extra`.
    pub fn without_local_fields(&self) -> Self {
        let mut event = self.clone();
        event
            .extra
            .retain(|field, _| !LOCAL_FIELDS.contains(&field.as_str()));
        event
    }
}

/// A cached time event: the remote fields plus local sync flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTimeEventRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub module: String,
    #[serde(rename = "isSynced", default)]
    pub is_synced: bool,
    #[serde(rename = "isPosted", default)]
    pub is_posted: bool,
    #[serde(flatten)]
    pub event: RemoteTimeEvent,
}

impl LocalTimeEventRecord {
    /// First local copy of a remote event.
    pub fn from_remote(event: &RemoteTimeEvent, is_posted: bool) -> Self {
        Self {
            id: None,
            module: TIME_EVENT_MODULE.to_string(),
            is_synced: true,
            is_posted,
            event: event.without_local_fields(),
        }
    }

    pub fn to_document(&self) -> Result<Document, DatabaseError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(DatabaseError::InvalidDocument(
                "record did not serialize to an object".to_string(),
            )),
            Err(e) => Err(DatabaseError::InvalidDocument(e.to_string())),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, DatabaseError> {
        serde_json::from_value(Value::Object(doc.clone())).map_err(|e| {
            DatabaseError::CorruptDocument {
                id: doc
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message: e.to_string(),
            }
        })
    }
}

/// Outcome counters of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// New local records (Approved or Posted).
    pub inserted: usize,
    /// Existing records moved to Posted.
    pub posted: usize,
    /// Records overwritten from a modified (`Origin = "M"`) remote record.
    pub merged: usize,
    /// Stale Posted records deleted.
    pub deleted: usize,
    /// Records skipped for missing key fields.
    pub skipped: usize,
    /// Store operations that failed and were skipped.
    pub failures: usize,
}

/// Persisted sync status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStatus {
    /// Last successful sync timestamp.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Last attempt, successful or not.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error of the last attempt, cleared on success.
    pub last_error: Option<String>,
    /// Number of remote records in the last fetched batch.
    pub fetched_count: usize,
    /// Counters of the last reconciliation pass.
    pub last_summary: ReconcileSummary,
    /// Whether a sync is currently in progress.
    pub in_progress: bool,
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("OData API error: {0}")]
    ODataApi(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication required")]
    AuthenticationRequired,
}
