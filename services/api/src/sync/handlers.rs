use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use storemesh_common::error::MeshError;
use storemesh_common::types::EntityType;
use storemesh_db::entity::repositories::CanonicalEntityRepository;
use storemesh_db::jobs::models::{EnqueueOutcome, NewSyncJob, SyncMode};
use storemesh_db::jobs::repositories::JobRepository;
use storemesh_db::sync::repositories::{CheckpointRepository, SyncRunRepository};
use storemesh_db::tenant::repositories::TenantRepository;

use crate::error::ApiError;
use crate::extractors::TenantId;
use crate::sync::requests::{CancelRequest, RunsQuery, TriggerRequest};
use crate::sync::responses::{
    CancelResponse, EntityStatus, RunView, RunsResponse, StatusResponse, TriggerResponse,
};
use crate::AppState;

const MAX_RUNS_PAGE: i64 = 100;

fn forbidden(message: &str) -> Response {
    let body = serde_json::json!({ "error": message });
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}

pub async fn trigger(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(req): Json<TriggerRequest>,
) -> Result<Response, ApiError> {
    let tenant = state
        .tenant_repo
        .find(tenant_id)
        .await?
        .ok_or_else(|| MeshError::NotFound(format!("tenant {tenant_id} not found")))?;
    if !tenant.enabled {
        return Ok(forbidden("tenant is disabled"));
    }

    let mode = req.mode.unwrap_or(SyncMode::Incremental);
    if mode == SyncMode::SingleRecord && req.external_id.is_none() {
        return Err(MeshError::Validation(
            "single_record mode requires external_id".to_string(),
        )
        .into());
    }

    let outcome = state
        .job_repo
        .enqueue(NewSyncJob {
            tenant_id,
            entity_type: req.entity_type,
            mode,
            external_id: req.external_id,
        })
        .await?;

    match outcome {
        EnqueueOutcome::Accepted(job) => {
            tracing::info!(
                tenant_id = %tenant_id,
                entity_type = %req.entity_type,
                mode = %mode,
                job_id = %job.id,
                "sync job enqueued"
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    job_id: Some(job.id),
                    deduped: false,
                }),
            )
                .into_response())
        }
        EnqueueOutcome::Deduped => Ok((
            StatusCode::OK,
            Json(TriggerResponse {
                job_id: None,
                deduped: true,
            }),
        )
            .into_response()),
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state
        .job_repo
        .request_cancel(tenant_id, req.entity_type)
        .await?;
    if cancelled {
        tracing::info!(
            tenant_id = %tenant_id,
            entity_type = %req.entity_type,
            "cancel requested"
        );
    }
    Ok(Json(CancelResponse { cancelled }))
}

pub async fn list_runs(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Query(query): Query<RunsQuery>,
) -> Result<Json<RunsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_RUNS_PAGE);
    let runs = state
        .run_repo
        .list_recent(tenant_id, query.entity_type, limit)
        .await?;
    Ok(Json(RunsResponse {
        runs: runs.into_iter().map(RunView::from).collect(),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut entities = Vec::with_capacity(EntityType::ALL.len());
    for entity_type in EntityType::ALL {
        let last_run = state.run_repo.latest(tenant_id, entity_type).await?;
        let checkpoint = state.checkpoint_repo.get(tenant_id, entity_type).await?;
        let records = state.canonical_repo.count(tenant_id, entity_type).await?;
        entities.push(EntityStatus {
            entity_type,
            last_run: last_run.map(RunView::from),
            checkpoint: checkpoint.map(|c| c.last_synced_at),
            records,
        });
    }
    Ok(Json(StatusResponse { entities }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::PgPool;
    use storemesh_db::entity::pg_repository::PgCanonicalRepository;
    use storemesh_db::jobs::pg_repository::PgJobRepository;
    use storemesh_db::sync::pg_repository::{PgCheckpointRepository, PgSyncRunRepository};
    use storemesh_db::tenant::models::NewTenant;
    use storemesh_db::tenant::pg_repository::PgTenantRepository;
    use storemesh_search::SearchProjector;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn test_state() -> Option<(AppState, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = storemesh_db::create_pool(&url).await.expect("db should connect");
        crate::test_support::ensure_schema(&pool).await?;
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

    async fn insert_tenant(state: &AppState, enabled: bool) -> Uuid {
        let tenant = state
            .tenant_repo
            .create(NewTenant {
                name: "Handler Test Store".to_string(),
                base_url: "https://shop.example.com".to_string(),
                consumer_key: "ck_test".to_string(),
                consumer_secret: "cs_test".to_string(),
                webhook_secret: "whsec_test".to_string(),
                currency: "EUR".to_string(),
                timezone: "UTC".to_string(),
            })
            .await
            .expect("create tenant");
        if !enabled {
            state
                .tenant_repo
                .set_enabled(tenant.id, false)
                .await
                .expect("disable tenant");
        }
        tenant.id
    }

    fn app(state: AppState) -> axum::Router {
        axum::Router::new()
            .merge(crate::sync::router())
            .with_state(state)
    }

    async fn read_body(resp: axum::http::Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn trigger_request(tenant_id: Uuid, body: serde_json::Value) -> Request<Body> {
        Request::post("/sync/trigger")
            .header("content-type", "application/json")
            .header("X-Tenant-Id", tenant_id.to_string())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn trigger_enqueues_and_dedups() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let tenant_id = insert_tenant(&state, true).await;

        let resp = app(state.clone())
            .oneshot(trigger_request(
                tenant_id,
                serde_json::json!({ "entity_type": "product" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = read_body(resp).await;
        assert_eq!(body["deduped"], false);
        assert!(body["job_id"].is_string());

        // Second trigger for the same key is absorbed.
        let resp = app(state)
            .oneshot(trigger_request(
                tenant_id,
                serde_json::json!({ "entity_type": "product" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_body(resp).await;
        assert_eq!(body["deduped"], true);
    }

    #[tokio::test]
    async fn trigger_unknown_tenant_is_404() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let resp = app(state)
            .oneshot(trigger_request(
                Uuid::new_v4(),
                serde_json::json!({ "entity_type": "order" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trigger_disabled_tenant_is_403() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let tenant_id = insert_tenant(&state, false).await;
        let resp = app(state)
            .oneshot(trigger_request(
                tenant_id,
                serde_json::json!({ "entity_type": "order" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn trigger_without_tenant_header_is_400() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let resp = app(state)
            .oneshot(
                Request::post("/sync/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "entity_type": "product" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn single_record_trigger_requires_an_external_id() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let tenant_id = insert_tenant(&state, true).await;
        let resp = app(state)
            .oneshot(trigger_request(
                tenant_id,
                serde_json::json!({ "entity_type": "product", "mode": "single_record" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_without_an_active_job_reports_false() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let tenant_id = insert_tenant(&state, true).await;
        let resp = app(state)
            .oneshot(
                Request::post("/sync/cancel")
                    .header("content-type", "application/json")
                    .header("X-Tenant-Id", tenant_id.to_string())
                    .body(Body::from(
                        serde_json::json!({ "entity_type": "review" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_body(resp).await;
        assert_eq!(body["cancelled"], false);
    }

    #[tokio::test]
    async fn status_covers_every_entity_type() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let tenant_id = insert_tenant(&state, true).await;
        let resp = app(state)
            .oneshot(
                Request::get("/sync/status")
                    .header("X-Tenant-Id", tenant_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_body(resp).await;
        assert_eq!(body["entities"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn runs_listing_is_tenant_scoped() {
        let Some((state, _pool)) = test_state().await else {
            return;
        };
        let tenant_id = insert_tenant(&state, true).await;
        let run = state
            .run_repo
            .start(tenant_id, EntityType::Order)
            .await
            .expect("start run");

        let resp = app(state)
            .oneshot(
                Request::get("/sync/runs?entity_type=order")
                    .header("X-Tenant-Id", tenant_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_body(resp).await;
        let runs = body["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["id"], run.id.to_string());

        // Another tenant sees nothing.
        let resp = app(test_state().await.unwrap().0)
            .oneshot(
                Request::get("/sync/runs")
                    .header("X-Tenant-Id", Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = read_body(resp).await;
        assert!(body["runs"].as_array().unwrap().is_empty());
    }
}
