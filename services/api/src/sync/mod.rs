pub mod handlers;
pub mod requests;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/trigger", post(handlers::trigger))
        .route("/sync/cancel", post(handlers::cancel))
        .route("/sync/runs", get(handlers::list_runs))
        .route("/sync/status", get(handlers::status))
}
