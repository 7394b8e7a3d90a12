//! Repodoc Store Server
//!
//! Serves versioned blobs from a data directory over the contents API, so
//! repodoc clients can use it as their remote store.
//!
//! # Configuration
//!
//! Environment variables:
//! - `REPODOC_PORT`: Port to listen on (default: 8080)
//! - `REPODOC_DATA_DIR`: Directory to store blobs (default: ~/.local/share/repodoc-server)
//! - `REPODOC_CONFIG`: Path to config file (default: ~/.config/repodoc-server/config.yaml)
//! - `REPODOC_WRITE_WAIT_SECS`: How long a write waits for the write lock (default: 30)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     name: "frontdesk"
//! ```

use repodoc::server::{self, ApiKeyStore, AppState, ServerStorage};
use repodoc_core::gate::{WriteGate, DEFAULT_MAX_WAIT};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Directory to store blobs
    data_dir: PathBuf,
    /// Path to config file
    config_path: PathBuf,
    /// Maximum wait for the write lock
    write_wait: Duration,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("REPODOC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("REPODOC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("repodoc-server")
            });

        let config_path = std::env::var("REPODOC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("repodoc-server")
                    .join("config.yaml")
            });

        let write_wait = std::env::var("REPODOC_WRITE_WAIT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_WAIT);

        Self {
            port,
            data_dir,
            config_path,
            write_wait,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repodoc=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // Ensure data directory exists
    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());
    tracing::info!("Write lock wait: {:?}", config.write_wait);

    let state = AppState::new(
        ApiKeyStore::load(&config.config_path),
        ServerStorage::new(config.data_dir),
        WriteGate::new(config.write_wait),
    );
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
