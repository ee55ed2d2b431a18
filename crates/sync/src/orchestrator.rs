use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use compsync_common::error::{CompsyncError, CompsyncResult};
use compsync_config::get_parsed_or;
use compsync_db::companies::repositories::CompanyRepository;
use compsync_db::sync::models::{RunCounts, SyncLog, SyncLogFilter, SyncLogFinish, SyncStatus};
use compsync_db::sync::repositories::SyncLogRepository;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, CompanyApiClient};
use crate::error::SyncError;
use crate::progress::{SyncProgress, SyncState};
use crate::reconcile::{ExistingIndex, Reconciler};

const INTERRUPTED_MESSAGE: &str = "interrupted: service stopped while the sync was running";

/// `insert_batch` binds 11 parameters per row; Postgres allows 65535 per statement.
pub const MAX_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_size: u32,
    pub batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            batch_size: 100,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> CompsyncResult<Self> {
        let settings = Self {
            page_size: get_parsed_or("DEFAULT_PAGE_SIZE", 50)?,
            batch_size: get_parsed_or("SYNC_BATCH_SIZE", 100)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> CompsyncResult<()> {
        if self.page_size == 0 || self.batch_size == 0 {
            return Err(CompsyncError::Config(
                "DEFAULT_PAGE_SIZE and SYNC_BATCH_SIZE must be positive".to_string(),
            ));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(CompsyncError::Config(format!(
                "SYNC_BATCH_SIZE must be at most {MAX_BATCH_SIZE}, got: {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// An accepted run, handed from `start` to `perform`.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub sync_id: i64,
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sync_id: i64,
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub duration_ms: i64,
}

/// How a run ended, as observed by whoever joins it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed { sync_id: i64, message: String },
    Cancelled { sync_id: i64 },
    Panicked { sync_id: i64, message: String },
}

impl RunOutcome {
    pub fn sync_id(&self) -> i64 {
        match self {
            Self::Completed(summary) => summary.sync_id,
            Self::Failed { sync_id, .. }
            | Self::Cancelled { sync_id }
            | Self::Panicked { sync_id, .. } => *sync_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Default)]
struct Shared {
    state: SyncState,
    cancel: Option<CancellationToken>,
}

struct Inner<C, L> {
    companies: Arc<C>,
    logs: Arc<L>,
    settings: SyncSettings,
    shared: Mutex<Shared>,
    /// Serialises the running check with the sync-log insert, and cancel.
    gate: tokio::sync::Mutex<()>,
    background: Mutex<Option<(i64, JoinHandle<RunOutcome>)>>,
}

impl<C, L> Inner<C, L> {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset progress, but only if it still belongs to `sync_id`.
    fn release(&self, sync_id: i64) {
        let mut shared = self.lock_shared();
        if shared.state.sync_id == Some(sync_id) {
            *shared = Shared::default();
        }
    }
}

/// Clears the running flag for its run however `perform` exits.
struct RunGuard<C, L> {
    inner: Arc<Inner<C, L>>,
    sync_id: i64,
}

impl<C, L> Drop for RunGuard<C, L> {
    fn drop(&mut self) {
        self.inner.release(self.sync_id);
    }
}

/// Owns the single sync lifecycle of the process.
pub struct SyncService<C, L> {
    inner: Arc<Inner<C, L>>,
}

impl<C, L> Clone for SyncService<C, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, L> SyncService<C, L>
where
    C: CompanyRepository + 'static,
    L: SyncLogRepository + 'static,
{
    pub fn new(companies: Arc<C>, logs: Arc<L>, settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                companies,
                logs,
                settings,
                shared: Mutex::new(Shared::default()),
                gate: tokio::sync::Mutex::new(()),
                background: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_shared().state.running
    }

    /// Accept a new run or reject it if one is active in this process.
    pub async fn start(&self) -> Result<SyncRun, SyncError> {
        self.start_checked(false).await
    }

    /// Like `start`, but also rejects when the sync log holds a `running` row,
    /// which may belong to another process sharing the store. Stale rows are
    /// left alone; `recover_interrupted` in the owning service clears them.
    pub async fn start_exclusive(&self) -> Result<SyncRun, SyncError> {
        self.start_checked(true).await
    }

    async fn start_checked(&self, check_store: bool) -> Result<SyncRun, SyncError> {
        let _gate = self.inner.gate.lock().await;

        let running = self.inner.lock_shared().state.running;
        if running {
            tracing::info!("sync start rejected, a run is already active");
            return Err(SyncError::AlreadyRunning);
        }

        if check_store {
            let filter = SyncLogFilter {
                limit: 1,
                status: Some(SyncStatus::Running),
            };
            let (active, _) = self.inner.logs.list(&filter).await?;
            if let Some(other) = active.first() {
                tracing::warn!(
                    sync_id = other.id,
                    started = %other.start_time,
                    "sync start rejected, the sync log already has a running row"
                );
                return Err(SyncError::AlreadyRunning);
            }
        }

        let now = Utc::now();
        let log = self.inner.logs.create_running(now).await?;
        let cancel = CancellationToken::new();
        {
            let mut shared = self.inner.lock_shared();
            shared.state = SyncState::begin(log.id, now);
            shared.cancel = Some(cancel.clone());
        }

        tracing::info!(sync_id = log.id, "sync run accepted");
        Ok(SyncRun {
            sync_id: log.id,
            started_at: now,
            cancel,
        })
    }

    /// Start a run and drive it on a background task. A supervisor awaits
    /// the task so a panic still ends in a `failed` row; its handle is kept
    /// so `join_background` can observe how the run ended.
    pub async fn trigger(&self, client: CompanyApiClient) -> Result<SyncRun, SyncError> {
        let run = self.start().await?;
        let service = self.clone();
        let task_run = run.clone();
        let task = tokio::spawn(async move { service.perform(&client, task_run).await });

        let supervisor = self.clone();
        let sync_id = run.sync_id;
        let handle = tokio::spawn(async move { supervisor.supervise(sync_id, task).await });

        let previous = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((run.sync_id, handle));
        if let Some((sync_id, _)) = previous {
            tracing::debug!(sync_id, "detaching previous background run");
        }
        Ok(run)
    }

    /// Wait for the most recent background run, if any.
    pub async fn join_background(&self) -> Option<RunOutcome> {
        let (sync_id, handle) = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(join_error) => {
                let message = format!("sync supervisor aborted: {join_error}");
                tracing::error!(sync_id, error = %message, "background sync did not finish");
                Some(RunOutcome::Panicked { sync_id, message })
            }
        }
    }

    /// Await a spawned run. A panic or abort is written as `failed` here,
    /// since the run itself never reached its terminal write.
    async fn supervise(&self, sync_id: i64, task: JoinHandle<RunOutcome>) -> RunOutcome {
        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let message = format!("sync task aborted: {join_error}");
                tracing::error!(sync_id, error = %message, "background sync did not finish");
                let finish = SyncLogFinish::failed(Utc::now(), None, message.clone(), None);
                if let Err(e) = self.inner.logs.finish(sync_id, finish).await {
                    tracing::error!(sync_id, error = %e, "failed to record aborted sync");
                }
                self.inner.release(sync_id);
                RunOutcome::Panicked { sync_id, message }
            }
        }
    }

    /// Drive an accepted run to a terminal state. Never returns an error;
    /// failures are recorded on the sync log and reported in the outcome.
    pub async fn perform(&self, client: &CompanyApiClient, run: SyncRun) -> RunOutcome {
        let sync_id = run.sync_id;
        let _guard = RunGuard {
            inner: Arc::clone(&self.inner),
            sync_id,
        };
        let started = Instant::now();
        let mut counts = RunCounts::default();

        let result = self.execute(client, &run, &mut counts).await;
        let duration_ms = started.elapsed().as_millis() as i64;
        let now = Utc::now();

        match result {
            Ok(()) => {
                let finish = SyncLogFinish::completed(now, counts, duration_ms);
                match self.inner.logs.finish(sync_id, finish).await {
                    Ok(Some(_)) => {
                        tracing::info!(
                            sync_id,
                            total = counts.total,
                            success = counts.success,
                            failed = counts.failed,
                            duration_ms,
                            "sync completed"
                        );
                        RunOutcome::Completed(RunSummary {
                            sync_id,
                            total: counts.total,
                            success: counts.success,
                            failed: counts.failed,
                            duration_ms,
                        })
                    }
                    Ok(None) => {
                        tracing::info!(sync_id, "sync finished after it was cancelled");
                        RunOutcome::Cancelled { sync_id }
                    }
                    Err(e) => {
                        tracing::error!(sync_id, error = %e, "failed to record completed sync");
                        RunOutcome::Failed {
                            sync_id,
                            message: e.to_string(),
                        }
                    }
                }
            }
            Err(SyncError::Cancelled) => {
                // Usually cancel() already wrote the row; this covers a token
                // cancelled without it.
                if let Err(e) = self
                    .inner
                    .logs
                    .finish(sync_id, SyncLogFinish::cancelled(now))
                    .await
                {
                    tracing::error!(sync_id, error = %e, "failed to record cancelled sync");
                }
                tracing::info!(sync_id, "sync stopped after cancellation");
                RunOutcome::Cancelled { sync_id }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    sync_id,
                    error = %message,
                    success = counts.success,
                    failed = counts.failed,
                    "sync failed"
                );
                let finish = SyncLogFinish::failed(now, Some(counts), message.clone(), Some(duration_ms));
                if let Err(e) = self.inner.logs.finish(sync_id, finish).await {
                    tracing::error!(sync_id, error = %e, "failed to record failed sync");
                }
                RunOutcome::Failed { sync_id, message }
            }
        }
    }

    async fn execute(
        &self,
        client: &CompanyApiClient,
        run: &SyncRun,
        counts: &mut RunCounts,
    ) -> Result<(), SyncError> {
        let settings = &self.inner.settings;
        let sync_id = run.sync_id;

        ensure_active(&run.cancel)?;
        let first = client
            .fetch_page(1, settings.page_size)
            .await
            .map_err(source_error)?;

        counts.total = first.total_count;
        let total_pages = first.total_pages;
        self.update_progress(sync_id, |state| {
            state.total_pages = total_pages;
            state.total_records = first.total_count;
        });
        tracing::info!(
            sync_id,
            total_records = first.total_count,
            total_pages,
            "source totals known"
        );

        let records = client
            .fetch_remaining(first, settings.page_size, &run.cancel)
            .await
            .map_err(source_error)?;

        counts.total = records.len() as i64;
        let total_batches =
            u32::try_from(records.len().div_ceil(settings.batch_size)).unwrap_or(u32::MAX);
        self.update_progress(sync_id, |state| {
            state.total_records = counts.total;
            state.total_pages = total_batches;
            state.current_page = 0;
        });
        tracing::info!(sync_id, records = counts.total, total_batches, "fetch complete");
        ensure_active(&run.cancel)?;

        let existing = self.inner.companies.list_active().await?;
        tracing::debug!(sync_id, existing = existing.len(), "existing index loaded");
        let mut index = ExistingIndex::from_rows(existing);
        let reconciler = Reconciler::new(Arc::clone(&self.inner.companies));

        for (batch_no, batch) in records.chunks(settings.batch_size).enumerate() {
            ensure_active(&run.cancel)?;

            match reconciler.process_batch(batch, &mut index, Utc::now()).await {
                Ok(outcome) => {
                    counts.success += outcome.success() as i64;
                    counts.failed += outcome.failed as i64;
                }
                Err((outcome, source)) => {
                    counts.success += outcome.success() as i64;
                    counts.failed += outcome.failed as i64;
                    return Err(SyncError::BatchFailed { outcome, source });
                }
            }

            let processed = counts.success + counts.failed;
            let current_page = u32::try_from(batch_no + 1).unwrap_or(u32::MAX);
            self.update_progress(sync_id, |state| {
                state.processed_records = processed;
                state.current_page = current_page;
            });
            tracing::debug!(sync_id, batch = batch_no + 1, processed, "batch done");
        }

        Ok(())
    }

    fn update_progress(&self, sync_id: i64, apply: impl FnOnce(&mut SyncState)) {
        let mut shared = self.inner.lock_shared();
        if shared.state.running && shared.state.sync_id == Some(sync_id) {
            apply(&mut shared.state);
            shared.state.last_update = Some(Utc::now());
        }
    }

    /// Cancel the active run. Returns false when nothing was running.
    pub async fn cancel(&self) -> Result<bool, SyncError> {
        let _gate = self.inner.gate.lock().await;

        let (sync_id, token) = {
            let shared = self.inner.lock_shared();
            match (shared.state.running, shared.state.sync_id) {
                (true, Some(id)) => (id, shared.cancel.clone()),
                _ => return Ok(false),
            }
        };

        if let Some(token) = token {
            token.cancel();
        }
        let finished = self
            .inner
            .logs
            .finish(sync_id, SyncLogFinish::cancelled(Utc::now()))
            .await?;
        self.inner.release(sync_id);

        match finished {
            Some(_) => {
                tracing::info!(sync_id, "sync cancelled");
                Ok(true)
            }
            None => {
                tracing::info!(sync_id, "cancel arrived after the run had ended");
                Ok(false)
            }
        }
    }

    pub fn progress(&self) -> SyncProgress {
        self.inner.lock_shared().state.snapshot(Utc::now())
    }

    /// Most recent run, or `None` if there has never been one.
    pub async fn status(&self) -> CompsyncResult<Option<SyncLog>> {
        self.inner.logs.latest().await
    }

    pub async fn history(&self, filter: &SyncLogFilter) -> CompsyncResult<(Vec<SyncLog>, i64)> {
        self.inner.logs.list(filter).await
    }

    /// Fail `running` rows left behind by a previous process. Call before the
    /// first `start`.
    pub async fn recover_interrupted(&self) -> CompsyncResult<u64> {
        let _gate = self.inner.gate.lock().await;
        if self.is_running() {
            return Ok(0);
        }
        let recovered = self
            .inner
            .logs
            .fail_interrupted(INTERRUPTED_MESSAGE, Utc::now())
            .await?;
        if recovered > 0 {
            tracing::warn!(recovered, "marked interrupted sync runs as failed");
        }
        Ok(recovered)
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

fn source_error(err: ClientError) -> SyncError {
    match err {
        ClientError::Cancelled => SyncError::Cancelled,
        other => SyncError::Source(other),
    }
}
