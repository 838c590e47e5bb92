mod engine;
mod mapper;
mod remote;
mod worker;

use std::sync::Arc;

use storemesh_config::{init_tracing, AppConfig};
use storemesh_db::entity::pg_repository::PgCanonicalRepository;
use storemesh_db::jobs::pg_repository::PgJobRepository;
use storemesh_db::sync::pg_repository::{PgCheckpointRepository, PgSyncRunRepository};
use storemesh_db::tenant::pg_repository::PgTenantRepository;
use storemesh_search::SearchProjector;

use crate::engine::SyncRunner;
use crate::remote::RemoteClientConfig;
use crate::worker::WorkerConfig;

#[tokio::main]
async fn main() {
    init_tracing("info");
    let _ = dotenvy::dotenv();

    tracing::info!(service = "storemesh-sync", "starting");

    let config = AppConfig::from_env().expect("configuration error");
    let pool = storemesh_db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");

    let projector =
        SearchProjector::new(&config.search_url, 30).expect("failed to create search client");

    let runner = Arc::new(SyncRunner::new(
        PgTenantRepository::new(pool.clone()),
        PgCanonicalRepository::new(pool.clone()),
        PgSyncRunRepository::new(pool.clone()),
        PgCheckpointRepository::new(pool.clone()),
        PgJobRepository::new(pool.clone()),
        projector,
        RemoteClientConfig::from_env(),
    ));

    let worker_config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = worker_config.concurrency,
        max_attempts = worker_config.max_attempts,
        "starting worker pool"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = worker::spawn_pool(
        runner,
        PgJobRepository::new(pool.clone()),
        worker_config,
        shutdown_rx,
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("shutdown signal received, draining workers");

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("sync service stopped");
}
