use std::time::Instant;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use compsync_common::error::CompsyncError;
use compsync_db::companies::models::{total_pages, CompanySearch};
use compsync_db::companies::repositories::CompanyQueryRepository;

use crate::companies::requests::CompanySearchParams;
use crate::companies::responses::{CompanyDetailResponse, CompanyListResponse, CompanySummary};
use crate::error::ApiError;
use crate::AppState;

pub async fn list_companies(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<CompanySearchParams>, QueryRejection>,
) -> Result<Json<CompanyListResponse>, ApiError> {
    let Query(params) = params?;
    let search = params.into_search(false)?;
    run_search(&state, &headers, search).await.map(Json)
}

pub async fn search_companies(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<CompanySearchParams>, QueryRejection>,
) -> Result<Json<CompanyListResponse>, ApiError> {
    let Query(params) = params?;
    let search = params.into_search(true)?;
    run_search(&state, &headers, search).await.map(Json)
}

async fn run_search(
    state: &AppState,
    headers: &HeaderMap,
    search: CompanySearch,
) -> Result<CompanyListResponse, ApiError> {
    let started = Instant::now();
    let (companies, total_count) = state.company_repo.search(&search).await?;

    if !search.query.is_empty() {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        // Search analytics are best effort.
        if let Err(e) = state
            .company_repo
            .record_search(&search.query, total_count, user_agent)
            .await
        {
            tracing::warn!(error = %e, "failed to record search query");
        }
    }

    Ok(CompanyListResponse {
        companies: companies.into_iter().map(CompanySummary::from).collect(),
        total_count,
        page: search.page,
        page_size: search.page_size,
        total_pages: total_pages(total_count, search.page_size),
        search_type: search.search_type.to_string(),
        query: search.query,
        processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

pub async fn get_company_detail(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<CompanyDetailResponse>, ApiError> {
    let Path(id) = id?;
    if id < 1 {
        return Err(CompsyncError::Validation("company id must be positive".to_string()).into());
    }

    let company = state
        .company_repo
        .get_active_by_id(id)
        .await?
        .ok_or_else(|| CompsyncError::NotFound(format!("company {id} not found")))?;

    Ok(Json(company.into()))
}
