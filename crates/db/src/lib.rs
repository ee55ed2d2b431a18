pub mod companies;
pub mod sync;

use compsync_common::error::{CompsyncError, CompsyncResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> CompsyncResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))
}

/// Apply the embedded schema migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> CompsyncResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| CompsyncError::Database(format!("migration failed: {e}")))?;
    tracing::info!("database migrations applied");
    Ok(())
}

/// Liveness check used by the health endpoint.
pub async fn ping(pool: &PgPool) -> bool {
    sqlx::query("select 1").execute(pool).await.is_ok()
}
