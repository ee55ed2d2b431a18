pub mod handlers;
pub mod requests;
pub mod responses;

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/companies", get(handlers::list_companies))
        .route("/api/companies/", get(handlers::list_companies))
        .route("/api/companies/search", get(handlers::search_companies))
        .route("/api/companies/detail/{id}", get(handlers::get_company_detail))
}
