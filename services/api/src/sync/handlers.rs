use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use compsync_common::error::CompsyncError;
use compsync_db::sync::models::SyncLog;
use compsync_sync::SyncProgress;

use crate::error::ApiError;
use crate::sync::requests::SyncHistoryParams;
use crate::sync::responses::{MessageResponse, SyncHistoryResponse, SyncStartResponse};
use crate::AppState;

const ESTIMATED_DURATION_MINUTES: i64 = 5;

pub async fn start_sync(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SyncStartResponse>), ApiError> {
    let run = state.sync_service.trigger(state.source_client.clone()).await?;
    tracing::info!(sync_id = run.sync_id, "sync triggered over http");

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncStartResponse {
            message: "Synchronization started".to_string(),
            sync_id: run.sync_id,
            estimated_duration_minutes: ESTIMATED_DURATION_MINUTES,
        }),
    ))
}

pub async fn get_sync_status(State(state): State<AppState>) -> Result<Json<SyncLog>, ApiError> {
    let log = state
        .sync_service
        .status()
        .await?
        .ok_or_else(|| CompsyncError::NotFound("no synchronization history found".to_string()))?;
    Ok(Json(log))
}

pub async fn get_sync_progress(State(state): State<AppState>) -> Json<SyncProgress> {
    Json(state.sync_service.progress())
}

pub async fn cancel_sync(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.sync_service.cancel().await? {
        return Err(
            CompsyncError::NotFound("no active synchronization to cancel".to_string()).into(),
        );
    }
    Ok(Json(MessageResponse {
        message: "Synchronization cancelled".to_string(),
    }))
}

pub async fn list_sync_history(
    State(state): State<AppState>,
    params: Result<Query<SyncHistoryParams>, QueryRejection>,
) -> Result<Json<SyncHistoryResponse>, ApiError> {
    let Query(params) = params?;
    let filter = params.into_filter()?;
    let (sync_logs, total_count) = state.sync_service.history(&filter).await?;
    Ok(Json(SyncHistoryResponse {
        sync_logs,
        total_count,
    }))
}
