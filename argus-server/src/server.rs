use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

use crate::config::ServerConfig;
use crate::endpoints;
use crate::middlewares;
use crate::service::{MetricsService, ServiceState};
use crate::storage::{MemoryStorage, MetricsStorage, PgStorage, StorageError};

/// Builds the axum application with all routes and middleware.
///
/// Service builder order: layers added first see requests first and
/// responses last. Decompression runs before the handlers so extractors see
/// plain bodies; compression wraps the response on the way out.
pub fn make_app(state: ServiceState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(middlewares::trace_http_layer())
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new());

    endpoints::routes(state.clone())
        .layer(middleware)
        .with_state(state)
}

/// Runs the collector server until interrupted.
///
/// On `SIGINT` or `SIGTERM` the listener drains in-flight requests, then
/// the storage backend is flushed: a final snapshot for the in-memory
/// store, a pool close for Postgres.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let storage = build_storage(&config).await?;
    let state = ServiceState::new(config.clone(), MetricsService::new(storage));

    let app = make_app(state.clone());
    let listener = TcpListener::bind(&config.address).await?;
    tracing::info!(address = %config.address, "collector server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, flushing storage");
    if let Err(error) = state.service().shutdown().await {
        tracing::error!(
            error = &error as &dyn std::error::Error,
            "failed to flush storage on shutdown"
        );
    }

    Ok(())
}

async fn build_storage(config: &ServerConfig) -> Result<MetricsStorage, StorageError> {
    if let Some(url) = config.database_url.as_deref() {
        tracing::info!("using the postgres storage backend");
        return Ok(MetricsStorage::Postgres(PgStorage::connect(url).await?));
    }

    let path = config.snapshot_path().map(PathBuf::from);
    let write_through = path.is_some() && config.store_interval().is_none();
    let storage = MemoryStorage::with_snapshots(path, write_through);

    if config.restore {
        // A broken snapshot must not keep the server down; log and start
        // empty instead.
        match storage.restore() {
            Ok(count) if count > 0 => {
                tracing::info!(count, "restored metrics from snapshot");
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to restore snapshot, starting empty"
                );
            }
        }
    }

    if let Some(interval) = config.store_interval() {
        storage.spawn_snapshotter(interval);
    }

    Ok(MetricsStorage::Memory(storage))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to install SIGINT handler"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to install SIGTERM handler"
                );
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
