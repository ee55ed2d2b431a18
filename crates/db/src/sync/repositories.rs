use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::sync::models::{SyncLog, SyncLogFilter, SyncLogFinish};
use compsync_common::error::CompsyncResult;

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    /// Insert a new row in `running` state with zero counts.
    async fn create_running(&self, start_time: DateTime<Utc>) -> CompsyncResult<SyncLog>;

    /// Apply a terminal transition, only if the row is still `running`.
    /// Returns `None` when the row was already terminal (or does not exist).
    async fn finish(&self, id: i64, finish: SyncLogFinish) -> CompsyncResult<Option<SyncLog>>;

    /// Most recent run by id.
    async fn latest(&self) -> CompsyncResult<Option<SyncLog>>;

    /// Newest-first runs matching the filter, plus the total matching count.
    async fn list(&self, filter: &SyncLogFilter) -> CompsyncResult<(Vec<SyncLog>, i64)>;

    /// Mark rows still `running` (left behind by a previous process) as failed.
    async fn fail_interrupted(&self, message: &str, at: DateTime<Utc>) -> CompsyncResult<u64>;
}
