//! vcweb-prefs - user preference service
//!
//! Startup: config file, tracing, root folder, database, shared secret,
//! then serve until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcweb_common::api::auth::load_shared_secret;
use vcweb_common::config::{
    config_file_path, RootFolderInitializer, RootFolderResolver, TomlConfig, DEFAULT_PORT,
};
use vcweb_common::db::init_database;
use vcweb_common::prefs::SqlitePreferenceStore;
use vcweb_prefs::{build_router, AppState, PreferenceService};

#[derive(Parser, Debug)]
#[command(name = "vcweb-prefs")]
#[command(about = "User preference service for vcweb")]
#[command(version)]
struct Args {
    /// Port to listen on [default: 5780]
    #[arg(short, long, env = "VCWEB_PORT")]
    port: Option<u16>,

    /// Folder holding vcweb.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file to read instead of the standard locations
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so its log level applies
    let config_path = args.config.clone().or_else(config_file_path);
    let loaded = config_path.as_deref().map(TomlConfig::load);
    let config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => TomlConfig::default(),
    };

    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("vcweb_prefs={0},vcweb_common={0},tower_http={0}", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting vcweb preference service (vcweb-prefs) v{}",
        env!("CARGO_PKG_VERSION")
    );
    match (&config_path, &loaded) {
        (Some(path), Some(Ok(_))) => info!("Config file: {}", path.display()),
        (Some(path), Some(Err(e))) => warn!("Ignoring config file {}: {}", path.display(), e),
        _ => info!("No config file, using compiled defaults"),
    }

    let resolver = RootFolderResolver::new()
        .with_config_file(config_path)
        .with_cli_arg(args.root_folder);
    let initializer = RootFolderInitializer::new(resolver.resolve_with(&config));
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let shared_secret = load_shared_secret(&pool)
        .await
        .context("Failed to load shared secret")?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("Loaded shared secret for API authentication");
    }

    let venues = config.venue_names();
    info!(
        "Venues: {}",
        venues.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
    );

    let store = Arc::new(SqlitePreferenceStore::new(pool));
    let state = AppState::new(PreferenceService::new(store, venues), shared_secret);
    let app = build_router(state);

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("vcweb-prefs listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
