use anyhow::{Context, Result};
use media_service::auth::JwtVerifier;
use media_service::{
    start_api_server, AppState, Config, InMemoryMetadataStore, MediaService, MetadataStore,
    ObjectStorage, PgMetadataStore, S3ObjectStorage,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting media service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let metadata_store: Arc<dyn MetadataStore> = if config.database.is_memory() {
        warn!("Using in-memory metadata store, records will not survive a restart");
        Arc::new(InMemoryMetadataStore::new())
    } else {
        let store = PgMetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?;

        // Run migrations if enabled
        if config.database.run_migrations {
            store
                .run_migrations()
                .await
                .context("Failed to run database migrations")?;
        }

        Arc::new(store)
    };

    let object_storage: Arc<dyn ObjectStorage> = Arc::new(
        S3ObjectStorage::new(&config.storage)
            .await
            .context("Failed to initialize object storage")?,
    );

    let media = Arc::new(MediaService::new(
        object_storage,
        metadata_store,
        config.storage.delete_concurrency,
    ));

    // Create API state
    let api_state = AppState {
        media,
        verifier: Arc::new(JwtVerifier::new(&config.auth.jwt_secret)),
    };

    start_api_server(api_state, &config.api, &config.upload, shutdown_signal()).await?;

    info!("Media service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Shutting down media service");
}
