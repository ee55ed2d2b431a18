use compsync_common::error::CompsyncError;
use compsync_db::sync::models::{SyncLogFilter, SyncStatus};
use serde::Deserialize;

const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct SyncHistoryParams {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

impl SyncHistoryParams {
    pub fn into_filter(self) -> Result<SyncLogFilter, CompsyncError> {
        let mut filter = SyncLogFilter::default();

        if let Some(limit) = self.limit {
            if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
                return Err(CompsyncError::Validation(format!(
                    "limit must be between 1 and {MAX_HISTORY_LIMIT}, got: {limit}"
                )));
            }
            filter.limit = limit;
        }

        filter.status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<SyncStatus>)
            .transpose()
            .map_err(CompsyncError::Validation)?;

        Ok(filter)
    }
}
