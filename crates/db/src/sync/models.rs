use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("unknown sync status: {value}")),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `sync_logs`: the durable record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub total_records: i64,
    pub success_records: i64,
    pub failed_records: i64,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
}

/// A terminal transition for a running row. Build it with one of the
/// constructors so the status is always terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogFinish {
    pub status: SyncStatus,
    pub end_time: DateTime<Utc>,
    /// `None` keeps the counts already on the row.
    pub counts: Option<RunCounts>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

impl SyncLogFinish {
    pub fn completed(end_time: DateTime<Utc>, counts: RunCounts, duration_ms: i64) -> Self {
        Self {
            status: SyncStatus::Completed,
            end_time,
            counts: Some(counts),
            error_message: None,
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failed(
        end_time: DateTime<Utc>,
        counts: Option<RunCounts>,
        error_message: impl Into<String>,
        duration_ms: Option<i64>,
    ) -> Self {
        Self {
            status: SyncStatus::Failed,
            end_time,
            counts,
            error_message: Some(error_message.into()),
            duration_ms,
        }
    }

    pub fn cancelled(end_time: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Cancelled,
            end_time,
            counts: None,
            error_message: None,
            duration_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncLogFilter {
    pub limit: i64,
    pub status: Option<SyncStatus>,
}

impl Default for SyncLogFilter {
    fn default() -> Self {
        Self {
            limit: 10,
            status: None,
        }
    }
}
