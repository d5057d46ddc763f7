//! Time-event synchronization layer.
//!
//! Pulls the remote OData time-event feed and reconciles it into the
//! local document store, which serves as the offline cache.

pub mod odata_client;
pub mod reconciler;
pub mod sync_engine;
pub mod types;

#[cfg(test)]
mod reconciler_tests;

pub use odata_client::{ODataClient, ODataConfig, OfflineFeed, RemoteFeed, PASSWORD_ENV};
pub use reconciler::SyncReconciler;
pub use sync_engine::SyncEngine;
pub use types::{
    EventKey, LocalTimeEventRecord, ReconcileSummary, RemoteTimeEvent, SyncError, SyncStatus,
    LOCAL_FIELDS, ORIGIN_MODIFIED, STATUS_APPROVED, STATUS_POSTED, SYNC_STATE_MODULE,
    TIME_EVENT_MODULE,
};
