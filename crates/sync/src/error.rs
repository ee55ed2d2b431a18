use compsync_common::error::CompsyncError;

use crate::client::ClientError;
use crate::reconcile::BatchOutcome;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync is already running")]
    AlreadyRunning,

    #[error("source fetch failed: {0}")]
    Source(#[from] ClientError),

    #[error("store error: {0}")]
    Store(#[from] CompsyncError),

    #[error("batch write failed: {source}")]
    BatchFailed {
        /// Counts for the failing batch, including the rolled-back records.
        outcome: BatchOutcome,
        source: CompsyncError,
    },

    #[error("sync cancelled")]
    Cancelled,
}

impl From<SyncError> for CompsyncError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyRunning => {
                CompsyncError::Conflict(SyncError::AlreadyRunning.to_string())
            }
            SyncError::Store(inner) => inner,
            SyncError::BatchFailed { source, .. } => source,
            other => CompsyncError::Internal(other.to_string()),
        }
    }
}
