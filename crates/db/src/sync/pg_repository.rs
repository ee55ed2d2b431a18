use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};

use crate::sync::models::{SyncLog, SyncLogFilter, SyncLogFinish, SyncStatus};
use crate::sync::repositories::SyncLogRepository;
use compsync_common::error::{CompsyncError, CompsyncResult};

const SYNC_LOG_COLUMNS: &str = "id, start_time, end_time, status, total_records, \
     success_records, failed_records, error_message, duration_ms";

#[derive(Clone)]
pub struct PgSyncLogRepository {
    pool: PgPool,
}

impl PgSyncLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> CompsyncResult<SyncLog> {
        let status_raw: String = row.get("status");
        let status = SyncStatus::from_str(&status_raw).map_err(CompsyncError::Internal)?;

        Ok(SyncLog {
            id: row.get("id"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            status,
            total_records: row.get("total_records"),
            success_records: row.get("success_records"),
            failed_records: row.get("failed_records"),
            error_message: row.get("error_message"),
            duration_ms: row.get("duration_ms"),
        })
    }
}

#[async_trait]
impl SyncLogRepository for PgSyncLogRepository {
    async fn create_running(&self, start_time: DateTime<Utc>) -> CompsyncResult<SyncLog> {
        let row = sqlx::query(&format!(
            "insert into sync_logs (start_time, status, total_records, success_records, failed_records)
             values ($1, 'running', 0, 0, 0)
             returning {SYNC_LOG_COLUMNS}"
        ))
        .bind(start_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn finish(&self, id: i64, finish: SyncLogFinish) -> CompsyncResult<Option<SyncLog>> {
        if !finish.status.is_terminal() {
            return Err(CompsyncError::Validation(format!(
                "sync log {id} cannot transition to {}",
                finish.status
            )));
        }

        let counts = finish.counts;
        let row = sqlx::query(&format!(
            "update sync_logs
             set status = $1, end_time = $2,
                 total_records = coalesce($3, total_records),
                 success_records = coalesce($4, success_records),
                 failed_records = coalesce($5, failed_records),
                 error_message = $6, duration_ms = $7
             where id = $8 and status = 'running'
             returning {SYNC_LOG_COLUMNS}"
        ))
        .bind(finish.status.as_str())
        .bind(finish.end_time)
        .bind(counts.map(|c| c.total))
        .bind(counts.map(|c| c.success))
        .bind(counts.map(|c| c.failed))
        .bind(&finish.error_message)
        .bind(finish.duration_ms)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn latest(&self) -> CompsyncResult<Option<SyncLog>> {
        let row = sqlx::query(&format!(
            "select {SYNC_LOG_COLUMNS} from sync_logs order by id desc limit 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn list(&self, filter: &SyncLogFilter) -> CompsyncResult<(Vec<SyncLog>, i64)> {
        let mut count_qb = QueryBuilder::<Postgres>::new("select count(*) as cnt from sync_logs");
        if let Some(status) = filter.status {
            count_qb.push(" where status = ").push_bind(status.as_str());
        }
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?
            .get("cnt");

        let mut qb = QueryBuilder::<Postgres>::new(format!("select {SYNC_LOG_COLUMNS} from sync_logs"));
        if let Some(status) = filter.status {
            qb.push(" where status = ").push_bind(status.as_str());
        }
        qb.push(" order by id desc limit ").push_bind(filter.limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?;

        let logs = rows
            .into_iter()
            .map(Self::map_row)
            .collect::<CompsyncResult<Vec<_>>>()?;
        Ok((logs, total))
    }

    async fn fail_interrupted(&self, message: &str, at: DateTime<Utc>) -> CompsyncResult<u64> {
        let result = sqlx::query(
            "update sync_logs
             set status = 'failed', end_time = $1, error_message = $2
             where status = 'running'",
        )
        .bind(at)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
