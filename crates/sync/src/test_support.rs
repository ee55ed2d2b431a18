use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compsync_common::error::{CompsyncError, CompsyncResult};
use compsync_db::companies::models::{Company, NewCompany};
use compsync_db::companies::repositories::CompanyRepository;
use compsync_db::sync::models::{SyncLog, SyncLogFilter, SyncLogFinish, SyncStatus};
use compsync_db::sync::repositories::SyncLogRepository;
use tokio::sync::Semaphore;

use crate::models::ExternalCompany;

pub fn external(id: i64, update_time: &str) -> ExternalCompany {
    ExternalCompany {
        id,
        company_name: Some(format!("Company {id}")),
        owner: Some("owner".to_string()),
        company_desc: None,
        adress: Some(format!("{id} Main St")),
        create_time: Some("2023-01-01 00:00:00".to_string()),
        update_time: Some(update_time.to_string()),
        code: None,
        uuid: None,
    }
}

#[derive(Default)]
pub struct MockCompanyRepo {
    rows: Mutex<BTreeMap<i64, Company>>,
    fail_writes: AtomicBool,
    panic_on_list: AtomicBool,
    /// When set, each insert consumes one permit before writing.
    insert_gate: Option<Arc<Semaphore>>,
}

impl MockCompanyRepo {
    pub fn with_rows(rows: Vec<Company>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|c| (c.id, c)).collect()),
            ..Self::default()
        }
    }

    /// Inserts block until the returned semaphore hands out a permit.
    pub fn with_insert_gate(permits: usize) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(permits));
        let repo = Self {
            insert_gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (repo, gate)
    }

    pub fn panic_on_list(&self) {
        self.panic_on_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Company> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: i64) -> Option<Company> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    fn check_writable(&self) -> CompsyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CompsyncError::Database("simulated write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CompanyRepository for MockCompanyRepo {
    async fn list_active(&self) -> CompsyncResult<Vec<Company>> {
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("list_active blew up");
        }
        Ok(self.rows().into_iter().filter(|c| c.is_active).collect())
    }

    async fn insert_batch(
        &self,
        companies: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> CompsyncResult<u64> {
        if let Some(gate) = &self.insert_gate {
            gate.acquire().await.unwrap().forget();
        }
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(dup) = companies.iter().find(|c| rows.contains_key(&c.id)) {
            return Err(CompsyncError::Database(format!(
                "duplicate key value: id {}",
                dup.id
            )));
        }
        for company in companies {
            rows.insert(company.id, company.clone().into_company(synced_at));
        }
        Ok(companies.len() as u64)
    }

    async fn update_batch(
        &self,
        companies: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> CompsyncResult<u64> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(missing) = companies.iter().find(|c| !rows.contains_key(&c.id)) {
            return Err(CompsyncError::NotFound(format!("company {}", missing.id)));
        }
        for company in companies {
            rows.insert(company.id, company.clone().into_company(synced_at));
        }
        Ok(companies.len() as u64)
    }
}

#[derive(Default, Clone)]
pub struct MockSyncLogRepo {
    logs: Arc<Mutex<Vec<SyncLog>>>,
}

impl MockSyncLogRepo {
    pub fn logs(&self) -> Vec<SyncLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn push(&self, log: SyncLog) {
        self.logs.lock().unwrap().push(log);
    }
}

#[async_trait]
impl SyncLogRepository for MockSyncLogRepo {
    async fn create_running(&self, start_time: DateTime<Utc>) -> CompsyncResult<SyncLog> {
        let mut logs = self.logs.lock().unwrap();
        let log = SyncLog {
            id: logs.len() as i64 + 1,
            start_time,
            end_time: None,
            status: SyncStatus::Running,
            total_records: 0,
            success_records: 0,
            failed_records: 0,
            error_message: None,
            duration_ms: None,
        };
        logs.push(log.clone());
        Ok(log)
    }

    async fn finish(&self, id: i64, finish: SyncLogFinish) -> CompsyncResult<Option<SyncLog>> {
        let mut logs = self.logs.lock().unwrap();
        let Some(log) = logs
            .iter_mut()
            .find(|l| l.id == id && l.status == SyncStatus::Running)
        else {
            return Ok(None);
        };
        log.status = finish.status;
        log.end_time = Some(finish.end_time);
        if let Some(counts) = finish.counts {
            log.total_records = counts.total;
            log.success_records = counts.success;
            log.failed_records = counts.failed;
        }
        log.error_message = finish.error_message;
        log.duration_ms = finish.duration_ms;
        Ok(Some(log.clone()))
    }

    async fn latest(&self) -> CompsyncResult<Option<SyncLog>> {
        Ok(self.logs.lock().unwrap().iter().max_by_key(|l| l.id).cloned())
    }

    async fn list(&self, filter: &SyncLogFilter) -> CompsyncResult<(Vec<SyncLog>, i64)> {
        let mut matching: Vec<SyncLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        let total = matching.len() as i64;
        matching.truncate(filter.limit.max(0) as usize);
        Ok((matching, total))
    }

    async fn fail_interrupted(&self, message: &str, at: DateTime<Utc>) -> CompsyncResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let mut count = 0;
        for log in logs.iter_mut().filter(|l| l.status == SyncStatus::Running) {
            log.status = SyncStatus::Failed;
            log.end_time = Some(at);
            log.error_message = Some(message.to_string());
            count += 1;
        }
        Ok(count)
    }
}
