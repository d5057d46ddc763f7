//! # Timeevents Core Library
//!
//! Offline cache and synchronization for employee time events. The CLI
//! is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Storage**: an embedded document store (SQLite-backed, or in
//!   memory) holding JSON documents partitioned by a `module` field,
//!   plus TOML-based configuration
//! - **Sync**: an OData client for the remote time-event feed, the
//!   reconciler that folds a fetched batch into the local cache, and a
//!   sync engine tying both together
//!
//! ## Key Components
//!
//! - [`SyncReconciler`]: reconciles a remote batch against the cache
//! - [`SyncEngine`]: fetch + reconcile + persisted status
//! - [`DocumentStore`]: the local store contract
//! - [`Config`]: application configuration management

pub mod error;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use storage::{Config, DocumentStore, MemoryStore, Query, SqliteStore};
pub use sync::{
    LocalTimeEventRecord, ODataClient, ODataConfig, OfflineFeed, ReconcileSummary, RemoteTimeEvent,
    SyncEngine, SyncError, SyncReconciler, SyncStatus,
};
