#![deny(unused)]
//! Resource lifecycle service.
//!
//! Bounds the growth of derived ingestion artifacts (cached segments, vector
//! embeddings, uploaded blobs, content-addressed metadata): deduplicates new
//! work, samples store utilization, and reclaims expired or excess resources
//! in the background.

use secrecy::ExposeSecret;
use std::sync::Arc;

use lifecycle_core::{
    config::{BackendsConfig, LifecycleConfig},
    traits::{DedupCatalog, ResourceStoreAdapter},
    types::ResourceKind,
};
use lifecycle_manager::{CleanupWorker, LifecycleManager};
use lifecycle_store::{
    InMemoryDedupCatalog, InMemoryResourceStore, QdrantConfig, QdrantVectorStore, RedisCacheStore, S3BlobStore,
    SqliteCatalog,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Invalid configuration is the only startup failure that aborts.
    let config = LifecycleConfig::load()?;

    lifecycle_telemetry::configure_tracing(&config.telemetry)?;

    tracing::info!("Starting resource-lifecycle v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = lifecycle_telemetry::setup_metrics_recorder()?;

    // =========================================================================
    // Backing stores
    // =========================================================================
    let (catalog_adapter, dedup_catalog) = build_catalog(&config.backends);

    let manager = LifecycleManager::builder()
        .with_config(config.clone())
        .with_adapter(build_cache(&config.backends))
        .with_adapter(build_vector_index(&config.backends).await)
        .with_adapter(build_blob_store(&config.backends).await)
        .with_adapter(catalog_adapter)
        .with_dedup_catalog(dedup_catalog)
        .build()?;
    let manager = Arc::new(manager);

    // =========================================================================
    // Background loops
    // =========================================================================
    let worker = CleanupWorker::spawn(manager.clone());

    // =========================================================================
    // Operational HTTP surface
    // =========================================================================
    let admin_state = Arc::new(lifecycle_admin::AdminState {
        manager: manager.clone(),
        metrics: Some(metrics_handle),
    });
    let app = lifecycle_admin::admin_router(admin_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = worker.shutdown(config.timeouts.shutdown_grace()).await;
    tracing::info!(
        completed = report.completed,
        aborted = report.aborted,
        "Shutdown complete"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn in_memory(kind: ResourceKind) -> Arc<dyn ResourceStoreAdapter> {
    tracing::info!(kind = %kind, "Using in-memory store");
    Arc::new(InMemoryResourceStore::new(kind))
}

fn build_cache(backends: &BackendsConfig) -> Arc<dyn ResourceStoreAdapter> {
    let Some(url) = &backends.redis_url else {
        return in_memory(ResourceKind::EphemeralCache);
    };

    match RedisCacheStore::new(url.expose_secret(), &backends.redis_prefix) {
        Ok(store) => {
            tracing::info!(prefix = %backends.redis_prefix, "Initializing Redis cache store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Redis cache store");
            in_memory(ResourceKind::EphemeralCache)
        }
    }
}

async fn build_vector_index(backends: &BackendsConfig) -> Arc<dyn ResourceStoreAdapter> {
    let Some(url) = &backends.qdrant_url else {
        return in_memory(ResourceKind::VectorIndex);
    };

    let qdrant = QdrantConfig {
        url: url.clone(),
        collection_name: backends.qdrant_collection.clone(),
        vector_size: backends.vector_size,
    };
    match QdrantVectorStore::new(&qdrant).await {
        Ok(store) => {
            tracing::info!(url = %url, collection = %qdrant.collection_name, "Initializing Qdrant vector store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Qdrant vector store");
            in_memory(ResourceKind::VectorIndex)
        }
    }
}

async fn build_blob_store(backends: &BackendsConfig) -> Arc<dyn ResourceStoreAdapter> {
    let Some(bucket) = &backends.s3_bucket else {
        return in_memory(ResourceKind::BlobStorage);
    };

    tracing::info!(bucket = %bucket, endpoint = ?backends.s3_endpoint, "Initializing S3 blob store");
    Arc::new(S3BlobStore::new(bucket, &backends.s3_prefix, backends.s3_endpoint.as_deref()).await)
}

/// The metadata catalog doubles as the dedup catalog.
fn build_catalog(backends: &BackendsConfig) -> (Arc<dyn ResourceStoreAdapter>, Arc<dyn DedupCatalog>) {
    if let Some(path) = &backends.sqlite_path {
        match SqliteCatalog::new(path) {
            Ok(catalog) => {
                tracing::info!(path = %path, "Initializing SQLite metadata catalog");
                let catalog = Arc::new(catalog);
                return (catalog.clone(), catalog);
            }
            Err(e) => tracing::error!(error = %e, "Failed to open SQLite metadata catalog"),
        }
    }

    tracing::info!("Using in-memory metadata catalog");
    let catalog = Arc::new(InMemoryDedupCatalog::new());
    (catalog.clone(), catalog)
}
