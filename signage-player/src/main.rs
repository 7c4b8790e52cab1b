//! Signage Player - main entry point
//!
//! Loads configuration, selects the store backend, starts the repositories
//! and schedulers, and serves the control API until shut down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use signage_common::config::load_config;
use signage_common::db::init_database;
use signage_common::events::EventBus;
use signage_common::model::ViewMode;
use signage_player::config::{Config, Overrides};
use signage_player::playback::{HttpPreloader, NoopPreloader, Preloader, VisualTiming};
use signage_player::store::StoreSelector;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for signage-player
#[derive(Parser, Debug)]
#[command(name = "signage-player")]
#[command(about = "Playback and sync engine for a signage display")]
#[command(version)]
struct Args {
    /// Config file (overrides SIGNAGE_CONFIG and the per-user file)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "SIGNAGE_PORT")]
    port: Option<u16>,

    /// Local database path
    #[arg(long, env = "SIGNAGE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Start in the administrative view (rotation stopped)
    #[arg(long)]
    admin: bool,
}

const EVENT_BUS_CAPACITY: usize = 256;
const PRELOAD_CACHE_ITEMS: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let level = args.log_level.clone().unwrap_or_else(|| file.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("signage_player={0},signage_common={0},tower_http=info", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_file(
        file,
        Overrides {
            port: args.port,
            db_path: args.db_path,
            admin: args.admin,
        },
    );

    info!("Starting signage player for app {}", config.file.app_id);
    info!("Database: {}", config.db_path.display());

    let db = init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let selector = Arc::new(StoreSelector::from_config(&config.file, db, events.clone()));

    let preloader: Arc<dyn Preloader> = if config.playback().preload {
        Arc::new(HttpPreloader::new(PRELOAD_CACHE_ITEMS).context("Failed to build preloader")?)
    } else {
        Arc::new(NoopPreloader)
    };

    let start_mode = if config.start_in_admin {
        ViewMode::Admin
    } else {
        ViewMode::Public
    };

    let ctx = signage_player::assemble(
        selector,
        events,
        VisualTiming::from(config.playback()),
        preloader,
        start_mode,
    )
    .await
    .context("Failed to start repositories")?;

    signage_player::api::run(config.bind_addr, ctx, shutdown_signal())
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
