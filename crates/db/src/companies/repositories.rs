use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::companies::models::{Company, CompanySearch, NewCompany};
use compsync_common::error::CompsyncResult;

/// Write side used by the sync engine.
#[async_trait]
pub trait CompanyRepository: Send + Sync {
    /// All active rows; the reconciliation index is built from this once per run.
    async fn list_active(&self) -> CompsyncResult<Vec<Company>>;

    /// Insert every record in one transaction. Returns the number written;
    /// on error nothing from this call is committed.
    async fn insert_batch(
        &self,
        companies: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> CompsyncResult<u64>;

    /// Update every record by id in one transaction, all-or-nothing.
    async fn update_batch(
        &self,
        companies: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> CompsyncResult<u64>;
}

/// Read side used by the HTTP query surface.
#[async_trait]
pub trait CompanyQueryRepository: Send + Sync {
    async fn get_active_by_id(&self, id: i64) -> CompsyncResult<Option<Company>>;

    /// One page of matches plus the total match count.
    async fn search(&self, search: &CompanySearch) -> CompsyncResult<(Vec<Company>, i64)>;

    async fn record_search(
        &self,
        query: &str,
        result_count: i64,
        user_agent: Option<&str>,
    ) -> CompsyncResult<()>;
}
