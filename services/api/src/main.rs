mod admin;
mod error;
mod extractors;
mod sync;
#[cfg(test)]
mod test_support;
mod webhooks;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use storemesh_common::types::ServiceInfo;
use storemesh_config::{init_tracing, AppConfig};
use storemesh_db::entity::pg_repository::PgCanonicalRepository;
use storemesh_db::jobs::pg_repository::PgJobRepository;
use storemesh_db::sync::pg_repository::{PgCheckpointRepository, PgSyncRunRepository};
use storemesh_db::tenant::pg_repository::PgTenantRepository;
use storemesh_search::SearchProjector;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub tenant_repo: PgTenantRepository,
    pub job_repo: PgJobRepository,
    pub run_repo: PgSyncRunRepository,
    pub checkpoint_repo: PgCheckpointRepository,
    pub canonical_repo: PgCanonicalRepository,
    pub projector: SearchProjector,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("storemesh-api"))
}

async fn metrics() -> impl IntoResponse {
    let body = "\
# HELP storemesh_up Service up indicator\n\
# TYPE storemesh_up gauge\n\
storemesh_up 1\n\
# HELP storemesh_info Service info\n\
# TYPE storemesh_info gauge\n\
storemesh_info{service=\"storemesh-api\",version=\"0.1.0\"} 1\n";

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            "x-tenant-id".parse().unwrap(),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/metrics", get(metrics))
        .merge(sync::router())
        .merge(webhooks::router())
        .merge(admin::router())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    tracing::info!(service = "storemesh-api", "starting");

    let pool = storemesh_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let projector =
        SearchProjector::new(&config.search_url, 30).expect("failed to create search client");

    let state = AppState {
        tenant_repo: PgTenantRepository::new(pool.clone()),
        job_repo: PgJobRepository::new(pool.clone()),
        run_repo: PgSyncRunRepository::new(pool.clone()),
        checkpoint_repo: PgCheckpointRepository::new(pool.clone()),
        canonical_repo: PgCanonicalRepository::new(pool),
        projector,
    };

    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::PgPool;
    use tower::ServiceExt;

    async fn test_state() -> Option<(AppState, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = storemesh_db::create_pool(&url).await.expect("db should connect");
        let state = AppState {
            tenant_repo: PgTenantRepository::new(pool.clone()),
            job_repo: PgJobRepository::new(pool.clone()),
            run_repo: PgSyncRunRepository::new(pool.clone()),
            checkpoint_repo: PgCheckpointRepository::new(pool.clone()),
            canonical_repo: PgCanonicalRepository::new(pool.clone()),
            projector: SearchProjector::new("http://127.0.0.1:9200", 5)
                .expect("client should build"),
        };
        Some((state, pool))
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let app = build_router(state);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn info_returns_service_name() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let app = build_router(state);
        let resp = app
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_is_prometheus_text() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let app = build_router(state);
        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }
}
