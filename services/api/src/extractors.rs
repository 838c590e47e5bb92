use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

/// Tenant scoping for the trigger/read endpoints. Webhooks carry the tenant
/// in the path instead, since the remote store cannot set custom headers.
pub struct TenantId(pub Uuid);

#[derive(Debug)]
pub struct TenantIdRejection(String);

impl IntoResponse for TenantIdRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.0 });
        (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantId {
    type Rejection = TenantIdRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("X-Tenant-Id")
            .ok_or_else(|| TenantIdRejection("missing X-Tenant-Id header".to_string()))?;

        let value = header
            .to_str()
            .map_err(|_| TenantIdRejection("invalid X-Tenant-Id header value".to_string()))?;

        let uuid = Uuid::parse_str(value)
            .map_err(|_| TenantIdRejection(format!("invalid UUID in X-Tenant-Id: {value}")))?;

        Ok(TenantId(uuid))
    }
}
