use clap::{Parser, Subcommand};
use repodoc_core::{HttpBlobClient, PendingDeletions, ReconcilingClient, SyncOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    ConfigCommand, DeleteCommand, ListCommand, PendingCommand, PutCommand, ShowCommand,
    StatusCommand,
};
use repodoc::config::Config;

#[derive(Parser)]
#[command(name = "repodoc")]
#[command(version)]
#[command(about = "Document storage on a versioned contents store", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the store is reachable and accepts the token
    Status(StatusCommand),

    /// List the documents of a collection
    List(ListCommand),

    /// Show one document
    Show(ShowCommand),

    /// Create or update a document
    Put(PutCommand),

    /// Delete a document
    Delete(DeleteCommand),

    /// Inspect or reset locally pending deletions
    Pending(PendingCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

/// Builds the store client described by the configuration.
fn open_client(config: &Config) -> Result<ReconcilingClient, Box<dyn std::error::Error>> {
    let blobs = HttpBlobClient::new(config.store_url.value.clone(), config.require_token()?);
    let sync = SyncOrchestrator::new(Arc::new(blobs))
        .with_concurrency(config.fetch_concurrency.value)
        .with_tombstone_namespace(config.tombstone_namespace.value.clone());
    let pending = PendingDeletions::load(&config.state_path.value);
    Ok(ReconcilingClient::new(sync, pending))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Status(cmd)) => {
            let client = open_client(&config)?;
            cmd.run(&client, &config).await?;
        }
        Some(Commands::List(cmd)) => {
            let client = open_client(&config)?;
            cmd.run(&client).await?;
        }
        Some(Commands::Show(cmd)) => {
            let client = open_client(&config)?;
            cmd.run(&client).await?;
        }
        Some(Commands::Put(cmd)) => {
            let client = open_client(&config)?;
            cmd.run(&client).await?;
        }
        Some(Commands::Delete(cmd)) => {
            let client = open_client(&config)?;
            cmd.run(&client).await?;
        }
        Some(Commands::Pending(cmd)) => {
            cmd.run(&config)?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
