use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compsync_common::error::CompsyncError;
use compsync_db::companies::models::{Company, NewCompany};
use compsync_db::companies::repositories::CompanyRepository;
use serde::Serialize;

use crate::models::ExternalCompany;

/// Snapshot of persisted companies keyed by id, taken once per run and kept
/// current as batches commit.
#[derive(Debug, Default)]
pub struct ExistingIndex {
    by_id: HashMap<i64, Company>,
}

impl ExistingIndex {
    pub fn from_rows(rows: Vec<Company>) -> Self {
        Self {
            by_id: rows.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&Company> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn record(&mut self, company: Company) {
        self.by_id.insert(company.id, company);
    }
}

/// Last-write-wins staleness check. Only a known-not-newer incoming update
/// time skips the write.
pub fn needs_update(existing: &Company, incoming: &NewCompany) -> bool {
    match (existing.update_time, incoming.update_time) {
        (Some(current), Some(candidate)) => candidate > current,
        _ => true,
    }
}

#[derive(Debug, Default)]
pub struct Partition {
    pub to_insert: Vec<NewCompany>,
    pub to_update: Vec<NewCompany>,
    pub skipped: u64,
    pub failed: u64,
}

/// Split a batch into inserts and updates against the index.
///
/// Records that fail to map are counted as failed and left out. Each
/// accepted record is folded into the index as it is classified, so an id
/// repeated later in the run compares against its newest version.
pub fn partition_batch(
    batch: &[ExternalCompany],
    index: &mut ExistingIndex,
    synced_at: DateTime<Utc>,
) -> Partition {
    let mut partition = Partition::default();

    for external in batch {
        let incoming = match external.to_new_company() {
            Ok(company) => company,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unmappable company");
                partition.failed += 1;
                continue;
            }
        };

        match index.get(incoming.id) {
            None => {
                index.record(incoming.clone().into_company(synced_at));
                partition.to_insert.push(incoming);
            }
            Some(existing) if needs_update(existing, &incoming) => {
                index.record(incoming.clone().into_company(synced_at));
                partition.to_update.push(incoming);
            }
            Some(_) => partition.skipped += 1,
        }
    }

    partition
}

/// Per-batch counts. Skipped records are successes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl BatchOutcome {
    pub fn success(&self) -> u64 {
        self.inserted + self.updated + self.skipped
    }

    pub fn processed(&self) -> u64 {
        self.success() + self.failed
    }
}

pub struct Reconciler<C> {
    companies: Arc<C>,
}

impl<C: CompanyRepository> Reconciler<C> {
    pub fn new(companies: Arc<C>) -> Self {
        Self { companies }
    }

    pub async fn apply_inserts(
        &self,
        records: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> Result<u64, CompsyncError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.companies.insert_batch(records, synced_at).await
    }

    pub async fn apply_updates(
        &self,
        records: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> Result<u64, CompsyncError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.companies.update_batch(records, synced_at).await
    }

    /// Partition a batch and write it: inserts in one transaction, then
    /// updates in another. A failed transaction counts all of its records as
    /// failed and stops the batch; the partial outcome rides on the error.
    pub async fn process_batch(
        &self,
        batch: &[ExternalCompany],
        index: &mut ExistingIndex,
        synced_at: DateTime<Utc>,
    ) -> Result<BatchOutcome, (BatchOutcome, CompsyncError)> {
        let partition = partition_batch(batch, index, synced_at);
        let mut outcome = BatchOutcome {
            skipped: partition.skipped,
            failed: partition.failed,
            ..Default::default()
        };

        if let Err(e) = self.apply_inserts(&partition.to_insert, synced_at).await {
            outcome.failed += (partition.to_insert.len() + partition.to_update.len()) as u64;
            return Err((outcome, e));
        }
        outcome.inserted = partition.to_insert.len() as u64;

        if let Err(e) = self.apply_updates(&partition.to_update, synced_at).await {
            outcome.failed += partition.to_update.len() as u64;
            return Err((outcome, e));
        }
        outcome.updated = partition.to_update.len() as u64;

        tracing::debug!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "batch reconciled"
        );
        Ok(outcome)
    }
}
