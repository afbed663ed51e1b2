//! Daemon entry point: load configuration, wire every component
//! together, serve the HTTP surface, and run the Synchronizer until a
//! shutdown signal is received (spec section 5, ambient operational
//! hygiene per `SPEC_FULL.md` section 5).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use content_mesh::access::AllowAllAccessChecker;
use content_mesh::analytics::LoggingAnalytics;
use content_mesh::blacklist::BlacklistOverlay;
use content_mesh::cache::EntityCache;
use content_mesh::cluster::dao::StaticDao;
use content_mesh::cluster::Cluster;
use content_mesh::config::CliOpts;
use content_mesh::failed::FailedDeploymentRegistry;
use content_mesh::history::HistoryManager;
use content_mesh::http::{self, AppState};
use content_mesh::pointers::PointerManager;
use content_mesh::service::{ContentServerService, ContentService};
use content_mesh::storage::FsStorage;
use content_mesh::sync::Synchronizer;
use tokio_util::sync::CancellationToken;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = CliOpts::parse();
    let config = opts.resolve()?;

    let storage = Arc::new(FsStorage::new(config.storage_root_folder.clone()));
    let pointers = Arc::new(PointerManager::new());
    let history = Arc::new(HistoryManager::new(content_mesh::history::DEFAULT_IMMUTABLE_DELTA_MS));
    let failed = Arc::new(FailedDeploymentRegistry::new());
    let cache = Arc::new(EntityCache::new(10_000));

    content_mesh::recovery::rebuild_from_storage(storage.as_ref(), &pointers, &history).await?;

    let inner_service = Arc::new(ContentService::new(
        storage,
        pointers,
        history,
        failed.clone(),
        cache,
        Arc::new(AllowAllAccessChecker),
        Arc::new(LoggingAnalytics),
        config.request_ttl_backwards_ms,
        config.request_ttl_forward_ms,
        config.max_upload_size_per_type_mb.clone(),
        config.allow_legacy_entities,
    ));
    let service: Arc<dyn ContentServerService> = Arc::new(BlacklistOverlay::new(inner_service));

    let cancel = CancellationToken::new();

    let dao = Arc::new(StaticDao::new(config.peers.clone()));
    let cluster = Arc::new(Cluster::new(dao, Duration::from_secs(30)));
    let synchronizer = Synchronizer::new(
        cluster,
        service.clone(),
        failed,
        Duration::from_secs(config.sync_interval_secs),
    );
    let sync_cancel = cancel.clone();
    let sync_handle = tokio::spawn(async move { synchronizer.run(sync_cancel).await });

    let state = AppState {
        service,
        server_name: config.server_name.clone(),
        version: VERSION.to_string(),
    };
    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server_port)).await?;
    info!(port = config.server_port, "content-mesh listening");

    let serve_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            serve_cancel.cancel();
        })
        .await?;

    sync_handle.await.ok();
    Ok(())
}
