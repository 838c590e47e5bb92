use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use storemesh_common::types::EntityType;
use storemesh_db::sync::repositories::CheckpointRepository;

use crate::error::ApiError;
use crate::extractors::TenantId;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReindexRequest {
    pub entity_type: EntityType,
}

/// Kick off a full drop-and-replace rebuild of one entity type's search
/// index. Runs in the background; readers stay on the old index until the
/// alias swap.
pub async fn reindex(
    State(state): State<AppState>,
    Json(req): Json<ReindexRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let projector = state.projector.clone();
    let repo = state.canonical_repo.clone();
    let entity_type = req.entity_type;

    tokio::spawn(async move {
        match projector.rebuild_index(entity_type, &repo).await {
            Ok(report) => {
                tracing::info!(
                    entity_type = %entity_type,
                    index = %report.index,
                    indexed = report.indexed,
                    failed = report.failed,
                    "reindex finished"
                );
            }
            Err(e) => {
                tracing::error!(entity_type = %entity_type, error = %e, "reindex failed");
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ResetCheckpointRequest {
    pub entity_type: EntityType,
}

/// Drop a tenant's incremental watermark so the next incremental run covers
/// the whole collection again.
pub async fn reset_checkpoint(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(req): Json<ResetCheckpointRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .checkpoint_repo
        .reset(tenant_id, req.entity_type)
        .await?;
    tracing::info!(
        tenant_id = %tenant_id,
        entity_type = %req.entity_type,
        "checkpoint reset"
    );
    Ok(Json(serde_json::json!({ "reset": true })))
}
