pub mod handlers;
pub mod requests;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sync", post(handlers::start_sync))
        .route("/api/sync/status", get(handlers::get_sync_status))
        .route("/api/sync/progress", get(handlers::get_sync_progress))
        .route("/api/sync/cancel", post(handlers::cancel_sync))
        .route("/api/sync/history", get(handlers::list_sync_history))
}
