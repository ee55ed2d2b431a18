use std::sync::Arc;
use std::time::Duration;

use compsync_common::error::{CompsyncError, CompsyncResult};
use compsync_config::{get_parsed_or, get_var_or};
use reqwest::{header, Client, StatusCode};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::models::{ApiEnvelope, CompanyPage, ExternalCompany};

const COMPANIES_PATH: &str = "/system/softwareCompany/list";
const SUCCESS_CODE: i64 = 200;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
    pub user_agent: String,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl ClientConfig {
    /// Load the source API config from environment, falling back to defaults.
    pub fn from_env() -> CompsyncResult<Self> {
        let config = Self {
            base_url: get_var_or("EXTERNAL_API_BASE_URL", "https://kaifazhe.fun/prod-api"),
            timeout_secs: get_parsed_or("EXTERNAL_API_TIMEOUT", 30)?,
            max_concurrent: get_parsed_or("EXTERNAL_API_MAX_CONCURRENT", 200)?,
            user_agent: get_var_or("EXTERNAL_API_USER_AGENT", "CC-Company-Sync/1.0"),
            retry_attempts: get_parsed_or("SYNC_RETRY_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(get_parsed_or("SYNC_RETRY_DELAY_MS", 1000)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CompsyncResult<()> {
        if self.timeout_secs == 0 {
            return Err(CompsyncError::Config(
                "EXTERNAL_API_TIMEOUT must be positive".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(CompsyncError::Config(
                "EXTERNAL_API_MAX_CONCURRENT must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn companies_url(&self) -> String {
        format!("{}{COMPANIES_PATH}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("source rejected request with code {code}: {msg}")]
    Rejected { code: i64, msg: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("page fetch task failed: {0}")]
    Task(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError { status, .. } => status.is_server_error(),
            Self::RequestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// One decoded page of the source listing.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: u32,
    pub records: Vec<ExternalCompany>,
    pub total_count: i64,
    pub total_pages: u32,
}

#[derive(Clone)]
pub struct CompanyApiClient {
    client: Client,
    config: ClientConfig,
}

impl CompanyApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs((config.timeout_secs / 3).max(1)))
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host((config.max_concurrent / 2).max(1))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch one page, retrying transient failures with exponential backoff.
    pub async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, ClientError> {
        tracing::debug!(page, page_size, "fetching companies page");

        let envelope = self.request_with_retry(page, page_size).await?;
        if envelope.code != SUCCESS_CODE {
            return Err(ClientError::Rejected {
                code: envelope.code,
                msg: envelope.msg.unwrap_or_default(),
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| ClientError::Decode(format!("page {page} has no data object")))?;

        let total_count = data.total.max(0);
        let total_pages = if page_size == 0 {
            0
        } else {
            let out_of_range = || ClientError::Decode(format!("total {total_count} is out of range"));
            let padded = total_count
                .checked_add(i64::from(page_size) - 1)
                .ok_or_else(out_of_range)?;
            u32::try_from(padded / i64::from(page_size)).map_err(|_| out_of_range())?
        };

        tracing::debug!(page, rows = data.rows.len(), "fetched companies page");
        Ok(PageResult {
            page,
            records: data.rows,
            total_count,
            total_pages,
        })
    }

    /// Fetch every page. Page 1 is fetched first to learn the page count.
    pub async fn fetch_all_pages(&self, page_size: u32) -> Result<Vec<ExternalCompany>, ClientError> {
        let first = self.fetch_page(1, page_size).await?;
        self.fetch_remaining(first, page_size, &CancellationToken::new())
            .await
    }

    /// Fetch pages `2..=first.total_pages` concurrently, at most `max_concurrent`
    /// in flight, and return all records in page order. Any page failure aborts
    /// the whole fetch.
    pub async fn fetch_remaining(
        &self,
        first: PageResult,
        page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExternalCompany>, ClientError> {
        let total_pages = first.total_pages.max(1) as usize;
        let mut pages: Vec<Option<Vec<ExternalCompany>>> = (0..total_pages).map(|_| None).collect();
        pages[0] = Some(first.records);

        if total_pages > 1 {
            tracing::info!(
                total_pages,
                max_concurrent = self.config.max_concurrent,
                "fetching remaining pages"
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut join_set: JoinSet<(u32, Result<PageResult, ClientError>)> = JoinSet::new();

        for page in 2..=total_pages as u32 {
            let client = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (page, Err(ClientError::Task("semaphore closed".to_string()))),
                };
                if cancel.is_cancelled() {
                    return (page, Err(ClientError::Cancelled));
                }
                (page, client.fetch_page(page, page_size).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((page, Ok(result))) => {
                    pages[page as usize - 1] = Some(result.records);
                }
                Ok((page, Err(e))) => {
                    tracing::error!(page, error = %e, "page fetch failed, aborting");
                    // Dropping the set aborts the pages still in flight.
                    return Err(e);
                }
                Err(join_error) => return Err(ClientError::Task(join_error.to_string())),
            }
        }

        let mut all = Vec::new();
        for (idx, page) in pages.into_iter().enumerate() {
            match page {
                Some(records) => all.extend(records),
                None => return Err(ClientError::Task(format!("page {} never completed", idx + 1))),
            }
        }

        tracing::info!(count = all.len(), "fetched all companies");
        Ok(all)
    }

    /// Reachability check: one record from page 1.
    pub async fn health_check(&self) -> bool {
        match self.fetch_page(1, 1).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "source API health check failed");
                false
            }
        }
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.config
            .retry_base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    async fn request_with_retry(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ApiEnvelope<CompanyPage>, ClientError> {
        let url = self.config.companies_url();
        let mut last_error = String::new();

        for attempt in 0..=self.config.retry_attempts {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt - 1);
                tracing::warn!(
                    page,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .get(&url)
                .query(&[("pageNum", page), ("pageSize", page_size)])
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let err = ClientError::RequestError(e);
                    if err.is_retryable() {
                        last_error = err.to_string();
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();

            if status.is_success() {
                let body = response.text().await.map_err(ClientError::RequestError)?;
                return serde_json::from_str(&body)
                    .map_err(|e| ClientError::Decode(format!("page {page}: {e}")));
            }

            let body = response.text().await.unwrap_or_default();
            let err = ClientError::HttpError { status, body };
            if err.is_retryable() {
                last_error = err.to_string();
                continue;
            }

            // 4xx: the request itself is wrong, another attempt would not help.
            return Err(err);
        }

        Err(ClientError::MaxRetriesExceeded {
            attempts: self.config.retry_attempts + 1,
            last_error,
        })
    }
}
