//! growdash-hc - Harvest Coordinator
//!
//! Owns harvest sessions: crew roster, plant ledger, completion summary.
//! Streams changes to observers over SSE and accepts the weighing edge
//! device over a WebSocket link.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use growdash_common::config::{
    default_config_path, load_toml_or_default, RootFolderInitializer, RootFolderResolver,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use growdash_hc::config::{CliOverrides, CoordinatorSettings, HcToml, MODULE_NAME};
use growdash_hc::coordinator::Coordinator;
use growdash_hc::device_bridge::EdgeBridge;
use growdash_hc::fanout::FanoutHub;
use growdash_hc::rooms::SqliteRoomDirectory;
use growdash_hc::AppState;

/// Command-line arguments for growdash-hc
#[derive(Parser, Debug)]
#[command(name = "growdash-hc")]
#[command(about = "Harvest recording coordinator for GrowDash")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, env = "GROWDASH_HC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to the per-user config directory)
    #[arg(short, long, env = "GROWDASH_HC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "GROWDASH_HC_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "GROWDASH_HC_BIND_HOST")]
    bind_host: Option<std::net::IpAddr>,

    /// Seconds an edge device may stay disconnected before clients are alerted
    #[arg(long, env = "GROWDASH_HC_DEVICE_GRACE_SECS")]
    device_grace_secs: Option<u64>,

    /// Shared secret the edge device must present as X-Device-Key
    #[arg(long, env = "GROWDASH_HC_DEVICE_API_KEY", hide_env_values = true)]
    device_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME));
    let toml: HcToml = config_path
        .as_deref()
        .map(load_toml_or_default::<HcToml>)
        .unwrap_or_default();

    // [logging] file redirects output from stderr
    let log_file = toml.logging.file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Arc::new(file)),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}; logging to stderr", path.display(), e);
                None
            }
        }
    });
    let (stderr_layer, file_layer) = match log_file {
        Some(file) => (
            None,
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file)),
        ),
        None => (Some(tracing_subscriber::fmt::layer()), None),
    };

    // RUST_LOG wins over the TOML log level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("growdash_hc={0},growdash_common={0},tower_http=info", toml.logging.level)
                    .into()
            }),
        )
        .with(stderr_layer)
        .with(file_layer)
        .init();

    info!(
        "Starting growdash-hc v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let settings = CoordinatorSettings::resolve(
        &CliOverrides {
            port: args.port,
            bind_host: args.bind_host,
            device_grace_secs: args.device_grace_secs,
            device_api_key: args.device_api_key.clone(),
        },
        &toml,
    );

    // Step 1: Resolve root folder
    let mut resolver = RootFolderResolver::new(MODULE_NAME).with_cli_arg(args.root_folder.clone());
    if let Some(path) = &config_path {
        resolver = resolver.with_toml_path(path.clone());
    }
    let root_folder = resolver.resolve();
    info!("Root folder: {}", root_folder.display());

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = growdash_hc::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    // Step 4: Restore in-progress sessions before accepting requests
    let rooms = Arc::new(SqliteRoomDirectory::new(db_pool.clone()));
    let fanout = FanoutHub::new(settings.event_capacity);
    let coordinator = Arc::new(Coordinator::new(db_pool, rooms, fanout));
    let restored = coordinator
        .restore()
        .await
        .context("Failed to restore in-progress sessions")?;
    info!("Restored {} in-progress harvest session(s)", restored);

    let bridge = EdgeBridge::new(coordinator.clone(), settings.device_grace);
    let state = AppState::new(coordinator, bridge, settings.device_api_key.clone());
    let app = growdash_hc::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind_addr))?;
    info!("Listening on http://{}", settings.bind_addr);
    info!("Health check: http://{}/health", settings.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
