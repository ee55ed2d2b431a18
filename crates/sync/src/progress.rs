use chrono::{DateTime, Utc};
use serde::Serialize;

/// In-memory state of the active run. One instance per service.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub running: bool,
    pub sync_id: Option<i64>,
    pub current_page: u32,
    pub total_pages: u32,
    pub processed_records: i64,
    pub total_records: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn begin(sync_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            running: true,
            sync_id: Some(sync_id),
            started_at: Some(now),
            last_update: Some(now),
            ..Default::default()
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_records <= 0 {
            return 0.0;
        }
        (self.processed_records as f64 / self.total_records as f64) * 100.0
    }

    /// Remaining time at the average rate so far.
    pub fn estimated_remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        if self.processed_records <= 0 {
            return None;
        }
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return None;
        }
        let rate = self.processed_records as f64 / elapsed;
        let remaining = (self.total_records - self.processed_records).max(0) as f64;
        Some((remaining / rate) as i64)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SyncProgress {
        if !self.running {
            return SyncProgress::idle();
        }
        SyncProgress {
            is_running: true,
            sync_id: self.sync_id,
            current_page: self.current_page,
            total_pages: self.total_pages,
            processed_records: self.processed_records,
            total_records: self.total_records,
            percentage: self.percentage(),
            start_time: self.started_at,
            last_update: self.last_update,
            estimated_remaining_seconds: self.estimated_remaining_seconds(now),
            current_operation: Some(format!(
                "Processing page {} of {}",
                self.current_page, self.total_pages
            )),
        }
    }
}

/// Point-in-time view handed to callers; never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub is_running: bool,
    pub sync_id: Option<i64>,
    pub current_page: u32,
    pub total_pages: u32,
    pub processed_records: i64,
    pub total_records: i64,
    pub percentage: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub estimated_remaining_seconds: Option<i64>,
    pub current_operation: Option<String>,
}

impl SyncProgress {
    pub fn idle() -> Self {
        Self {
            is_running: false,
            sync_id: None,
            current_page: 0,
            total_pages: 0,
            processed_records: 0,
            total_records: 0,
            percentage: 0.0,
            start_time: None,
            last_update: None,
            estimated_remaining_seconds: None,
            current_operation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn idle_snapshot_is_zeroed() {
        let mut state = SyncState::begin(4, Utc::now());
        state.processed_records = 10;
        state.running = false;
        assert_eq!(state.snapshot(Utc::now()), SyncProgress::idle());
    }

    #[test]
    fn percentage_and_eta_follow_average_rate() {
        let start = Utc::now();
        let mut state = SyncState::begin(1, start);
        state.total_records = 100;
        state.processed_records = 30;
        state.current_page = 1;
        state.total_pages = 2;

        let snapshot = state.snapshot(start + Duration::seconds(30));
        assert_eq!(snapshot.percentage, 30.0);
        assert_eq!(snapshot.estimated_remaining_seconds, Some(70));
        assert_eq!(
            snapshot.current_operation.as_deref(),
            Some("Processing page 1 of 2")
        );
    }

    #[test]
    fn no_eta_before_first_record() {
        let start = Utc::now();
        let mut state = SyncState::begin(1, start);
        state.total_records = 100;
        assert_eq!(state.estimated_remaining_seconds(start + Duration::seconds(5)), None);
        assert_eq!(state.percentage(), 0.0);
    }
}
