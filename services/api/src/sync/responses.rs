use compsync_db::sync::models::SyncLog;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SyncStartResponse {
    pub message: String,
    pub sync_id: i64,
    pub estimated_duration_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SyncHistoryResponse {
    pub sync_logs: Vec<SyncLog>,
    pub total_count: i64,
}
