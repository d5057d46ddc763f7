//! Sync subcommand: pull the OData feed into the local cache.

use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use timeevents_core::sync::odata_client::parse_feed;
use timeevents_core::{
    Config, ODataClient, ODataConfig, OfflineFeed, ReconcileSummary, SqliteStore, SyncEngine,
};

use super::block_on;

#[derive(Subcommand)]
pub enum SyncAction {
    /// Fetch recent time events and reconcile the cache
    Run {
        /// Employee to sync (defaults to sync.employee_id)
        #[arg(short, long)]
        employee: Option<String>,
        /// Days back from today (defaults to sync.window_days)
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Show the status of the last sync
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile a saved OData response without contacting the server
    Import {
        /// JSON file holding a `d.results` or `value` envelope
        file: PathBuf,
    },
}

pub fn run(action: SyncAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SyncAction::Run { employee, days } => {
            let config = Config::load()?;
            let employee = match employee {
                Some(employee) => employee,
                None => config.employee_id()?.to_string(),
            };
            let days = days.unwrap_or(config.sync.window_days);
            let client = Arc::new(ODataClient::new(ODataConfig::from_config(&config)?)?);
            let engine = SyncEngine::new(Arc::new(SqliteStore::open()?), client);

            let summary = block_on(engine.sync_recent(&employee, days))??;
            print_summary(&summary);
        }
        SyncAction::Status { json } => {
            let engine = offline_engine()?;
            let status = block_on(engine.status())??;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match status.last_sync_at {
                    Some(at) => println!("Last sync: {}", at.to_rfc3339()),
                    None => println!("Last sync: never"),
                }
                if let Some(error) = &status.last_error {
                    println!("Last error: {error}");
                }
                println!("Fetched: {}", status.fetched_count);
                print_summary(&status.last_summary);
            }
        }
        SyncAction::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let body: serde_json::Value = serde_json::from_str(&content)?;
            let remote = parse_feed(&body)?;
            tracing::info!(file = %file.display(), count = remote.len(), "importing saved feed");
            let engine = offline_engine()?;
            let summary = block_on(engine.apply_batch(&remote))?;
            print_summary(&summary);
        }
    }
    Ok(())
}

/// Engine for commands that only read or write the local cache.
pub(crate) fn offline_engine(
) -> Result<SyncEngine<SqliteStore, OfflineFeed>, Box<dyn std::error::Error>> {
    Ok(SyncEngine::new(Arc::new(SqliteStore::open()?), Arc::new(OfflineFeed)))
}

fn print_summary(summary: &ReconcileSummary) {
    println!(
        "Inserted: {}  Posted: {}  Merged: {}  Deleted: {}  Skipped: {}  Failures: {}",
        summary.inserted,
        summary.posted,
        summary.merged,
        summary.deleted,
        summary.skipped,
        summary.failures
    );
}
