use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas_core::{
    create_progress_tracker, load_config, validate_config, ChapterFetchCoordinator,
    LibraryManager, LibraryStore, SourceRegistry, SqliteLibraryStore,
};

use atlas_server::api::{create_router, WsBroadcaster};
use atlas_server::state::{reap_idle_sessions, AppState};

/// Buffer size for the progress update channel
const PROGRESS_BUFFER_SIZE: usize = 1000;

/// How long to wait for pending progress writes at shutdown
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("ATLAS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite library store
    let store: Arc<dyn LibraryStore> = Arc::new(
        SqliteLibraryStore::new(&config.database.path)
            .context("Failed to create library store")?,
    );
    info!("Library store initialized");

    // Create novel sources
    let sources =
        SourceRegistry::from_config(&config.sources).context("Failed to create novel sources")?;
    info!("Novel sources: {}", sources.names().join(", "));

    // WebSocket broadcaster, fed by store change events
    let ws_broadcaster = WsBroadcaster::default();
    let forwarder_handle = ws_broadcaster.forward_store_events(&store);

    let library = Arc::new(LibraryManager::new(Arc::clone(&store), sources));

    // Previews left from earlier runs are never shown again
    match library.sweep_stale_previews().await {
        Ok(count) => info!("Removed {} stale previews", count),
        Err(e) => warn!("Failed to sweep stale previews: {}", e),
    }

    let coordinator = ChapterFetchCoordinator::new(Arc::clone(&library));

    // Create progress tracking system
    let (tracker, progress_writer) = create_progress_tracker(
        Arc::clone(&store),
        Duration::from_millis(config.reader.progress_debounce_ms),
        PROGRESS_BUFFER_SIZE,
    );

    // Spawn progress writer task
    let writer_handle = tokio::spawn(progress_writer.run());

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        coordinator,
        tracker.clone(),
        ws_broadcaster,
    ));

    // Close reader sessions a client abandoned without closing them
    let reaper_handle = tokio::spawn(reap_idle_sessions(
        Arc::clone(&state),
        Duration::from_secs(config.reader.session_idle_secs),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // The reaper holds the last AppState and its tracker clone
    reaper_handle.abort();
    let _ = reaper_handle.await;

    // Write every pending reading position before the tracker goes away
    match tracker.flush().await {
        Ok(count) => info!("Flushed {} pending reading positions", count),
        Err(e) => error!("Failed to flush reading progress: {}", e),
    }

    // The writer exits once every tracker clone is dropped. The router
    // (and the AppState clone it held) is already gone.
    drop(tracker);
    match tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, writer_handle).await {
        Ok(_) => info!("Progress writer stopped"),
        Err(_) => warn!("Progress writer did not stop in time"),
    }

    forwarder_handle.abort();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
