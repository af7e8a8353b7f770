use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidley_core::{
    load_config, validate_config, CommandTokenGenerator, DirectHttpEngine, DownloadManager,
    LogNotifier, MediaEngine, Notifier, SqliteJobStore, SqliteTokenStore, StorageCleaner,
    TokenGenerator, TokenLifecycle, TokenProbe, TokenStore, YtDlpEngine,
};

use vidley_server::api::create_router;
use vidley_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
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
    let config_path = std::env::var("VIDLEY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let mut config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Engines always write into the storage output directory.
    config.engines.ytdlp.output_dir = config.storage.output_dir.clone();
    config.engines.direct.output_dir = config.storage.output_dir.clone();

    info!("Configuration loaded successfully (vidley {})", VERSION);
    info!("Database path: {:?}", config.database.path);
    info!("Output directory: {:?}", config.storage.output_dir);

    // Compute config hash for startup logging
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    std::fs::create_dir_all(&config.storage.output_dir)
        .context("Failed to create output directory")?;

    // Create SQLite job store
    let job_store = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    // Create SQLite token store
    let token_store: Arc<dyn TokenStore> = Arc::new(
        SqliteTokenStore::new(&config.database.path).context("Failed to create token store")?,
    );
    info!("Token store initialized");

    // Resolved proxy for all outbound engine and probe traffic
    let proxy = config.network.to_proxy_handle();
    match proxy.url() {
        Some(url) => info!("Routing engine traffic through proxy {}", url),
        None => info!("No proxy configured, direct connections"),
    }

    // Engines: yt-dlp (primary, also the token probe) and direct HTTP
    // (secondary)
    let ytdlp = Arc::new(YtDlpEngine::new(
        config.engines.ytdlp.clone(),
        proxy.clone(),
    ));
    let direct = Arc::new(DirectHttpEngine::new(
        config.engines.direct.clone(),
        proxy.clone(),
    ));
    info!(
        "Engines initialized (primary: {}, secondary: {})",
        config.engines.ytdlp.binary_path, "direct-http"
    );

    // Token lifecycle: the probe is the primary engine itself so probe and
    // download share one outbound path.
    let probe: Arc<dyn TokenProbe> = Arc::clone(&ytdlp) as Arc<dyn TokenProbe>;
    let generator: Arc<dyn TokenGenerator> = Arc::new(CommandTokenGenerator::new(
        &config.token.generator_command,
        Duration::from_secs(config.token.generator_timeout_secs),
    ));
    if config.token.generator_command.is_empty() {
        info!("No token generator configured; lifecycle is probe-only");
    }
    let tokens = Arc::new(TokenLifecycle::new(
        config.token.to_lifecycle_config(),
        token_store,
        probe,
        generator,
    ));

    // Storage cleaner: periodic plus post-completion enforcement
    let cleaner = Arc::new(StorageCleaner::new(
        config.storage.to_policy(),
        config.storage.output_dir.clone(),
        job_store.clone(),
    ));
    let (cleaner_shutdown_tx, cleaner_shutdown_rx) = broadcast::channel(1);
    let cleaner_handle = Arc::clone(&cleaner).spawn_periodic(cleaner_shutdown_rx);

    // Download manager
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new());
    let manager = Arc::new(
        DownloadManager::new(
            config.manager.clone(),
            job_store,
            Arc::clone(&ytdlp) as Arc<dyn MediaEngine>,
            Arc::clone(&direct) as Arc<dyn MediaEngine>,
            Arc::clone(&tokens),
            notifier,
        )
        .with_cleaner(Arc::clone(&cleaner)),
    );
    manager.start().await;
    info!("Download manager started");

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&manager),
        cleaner,
        tokens,
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

    // Stop background work
    info!("Server shutting down...");
    manager.stop().await;
    let _ = cleaner_shutdown_tx.send(());
    let _ = cleaner_handle.await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
