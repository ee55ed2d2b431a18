//! Company sync engine: pulls the paginated source listing, reconciles it
//! against the local store and tracks the single active run.

pub mod client;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ClientConfig, ClientError, CompanyApiClient};
pub use error::SyncError;
pub use orchestrator::{RunOutcome, RunSummary, SyncRun, SyncService, SyncSettings};
pub use progress::SyncProgress;
