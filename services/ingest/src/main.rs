use std::process::ExitCode;
use std::sync::Arc;

use compsync_common::error::{CompsyncError, CompsyncResult};
use compsync_config::{init_tracing, AppConfig};
use compsync_db::companies::pg_repository::PgCompanyRepository;
use compsync_db::sync::pg_repository::PgSyncLogRepository;
use compsync_sync::{ClientConfig, CompanyApiClient, RunOutcome, SyncService, SyncSettings};

/// Run one sync in the foreground. Intended for cron and manual backfills.
async fn run() -> CompsyncResult<RunOutcome> {
    let config = AppConfig::from_env()?;
    let client_config = ClientConfig::from_env()?;
    let settings = SyncSettings::from_env()?;

    let pool = compsync_db::create_pool(&config.database_url).await?;
    compsync_db::run_migrations(&pool).await?;

    let client = CompanyApiClient::new(client_config)
        .map_err(|e| CompsyncError::Config(format!("failed to build http client: {e}")))?;
    let service = SyncService::new(
        Arc::new(PgCompanyRepository::new(pool.clone())),
        Arc::new(PgSyncLogRepository::new(pool)),
        settings,
    );

    // The API service may share this database; never touch its rows.
    let run = service.start_exclusive().await?;
    tracing::info!(sync_id = run.sync_id, "running sync in foreground");

    let perform = service.perform(&client, run);
    tokio::pin!(perform);
    tokio::select! {
        outcome = &mut perform => Ok(outcome),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received, cancelling sync");
            service.cancel().await?;
            Ok(perform.await)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info");
    tracing::info!(service = "compsync-ingest", "starting");

    match run().await {
        Ok(RunOutcome::Completed(summary)) => {
            tracing::info!(
                sync_id = summary.sync_id,
                total = summary.total,
                success = summary.success,
                failed = summary.failed,
                duration_ms = summary.duration_ms,
                "sync finished"
            );
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            tracing::error!(sync_id = outcome.sync_id(), ?outcome, "sync did not complete");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "sync could not run");
            ExitCode::FAILURE
        }
    }
}
