use clap::{Parser, Subcommand};
use timeevents_core::storage::LoggingConfig;
use timeevents_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "timeevents", version, about = "Timeevents offline cache CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the local cache with the OData feed
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Inspect cached time events
    Events {
        #[command(subcommand)]
        action: commands::events::EventsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Log to stderr; RUST_LOG overrides the configured level.
fn init_tracing() {
    let config = Config::read_or_default();
    let level = match &config {
        Ok(config) => config.logging.level.clone(),
        Err(_) => LoggingConfig::default().level,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config {
        tracing::warn!(error = %e, "using default log level");
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Events { action } => commands::events::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
