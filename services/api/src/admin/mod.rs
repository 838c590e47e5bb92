pub mod handlers;

use axum::routing::post;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/reindex", post(handlers::reindex))
        .route("/admin/checkpoint/reset", post(handlers::reset_checkpoint))
}
