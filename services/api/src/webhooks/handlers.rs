use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use storemesh_common::types::EntityType;
use storemesh_db::jobs::models::{NewSyncJob, SyncMode};
use storemesh_db::jobs::repositories::JobRepository;
use storemesh_db::tenant::repositories::TenantRepository;

use crate::error::ApiError;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-wc-webhook-signature";
const TOPIC_HEADER: &str = "x-wc-webhook-topic";

/// Verify the store's webhook signature: base64 of HMAC-SHA256 over the raw
/// body. `verify_slice` compares in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature_b64: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Map a webhook topic ("order.updated", "product.review.created") to the
/// entity type it concerns. The event suffix is irrelevant: every event
/// becomes a single-record refetch, and a deleted record surfaces as a 404
/// during that fetch.
pub fn topic_entity_type(topic: &str) -> Option<EntityType> {
    let (resource, _event) = topic.rsplit_once('.')?;
    match resource {
        "product" => Some(EntityType::Product),
        "order" => Some(EntityType::Order),
        "customer" => Some(EntityType::Customer),
        "product.review" => Some(EntityType::Review),
        _ => None,
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, Json(body)).into_response()
}

pub async fn receive(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(tenant) = state.tenant_repo.find(tenant_id).await? else {
        return Ok(reject(StatusCode::NOT_FOUND, "unknown tenant"));
    };
    if !tenant.enabled {
        return Ok(reject(StatusCode::FORBIDDEN, "tenant is disabled"));
    }

    // Authenticate before reading anything out of the payload.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&tenant.webhook_secret, &body, signature) {
        tracing::warn!(tenant_id = %tenant_id, "webhook signature mismatch");
        return Ok(reject(StatusCode::UNAUTHORIZED, "invalid signature"));
    }

    let topic = headers
        .get(TOPIC_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let Some(entity_type) = topic_entity_type(topic) else {
        return Ok(reject(
            StatusCode::BAD_REQUEST,
            &format!("unsupported topic: {topic}"),
        ));
    };

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return Ok(reject(StatusCode::BAD_REQUEST, "body is not valid JSON")),
    };
    let Some(external_id) = payload["id"].as_i64() else {
        return Ok(reject(StatusCode::BAD_REQUEST, "payload has no record id"));
    };

    let outcome = state
        .job_repo
        .enqueue(NewSyncJob {
            tenant_id,
            entity_type,
            mode: SyncMode::SingleRecord,
            external_id: Some(external_id),
        })
        .await?;

    tracing::info!(
        tenant_id = %tenant_id,
        entity_type = %entity_type,
        external_id,
        topic,
        deduped = !outcome.is_accepted(),
        "webhook accepted"
    );

    // 202 either way: a deduped webhook is covered by the already-active job
    // and the store must not retry it.
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": true })),
    )
        .into_response())
}
