mod config;
pub mod document;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use config::{Config, LoggingConfig, ODataSection, SyncSection};
pub use document::{Document, DocumentStore, Modifier, Query, UpdateOptions};
pub use memory::{MemoryStore, StoreOp};
pub use sqlite::SqliteStore;

use std::path::PathBuf;

/// Returns `~/.config/timeevents[-dev]/` based on TIMEEVENTS_ENV.
///
/// Set TIMEEVENTS_ENV=dev to use the development data directory, or
/// TIMEEVENTS_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("TIMEEVENTS_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("TIMEEVENTS_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("timeevents-dev")
            } else {
                base_dir.join("timeevents")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
