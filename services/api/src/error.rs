use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use storemesh_common::error::MeshError;

pub struct ApiError(pub MeshError);

impl From<MeshError> for ApiError {
    fn from(err: MeshError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            MeshError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            MeshError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
