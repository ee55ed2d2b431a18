use chrono::{DateTime, Utc};
use compsync_db::companies::models::Company;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CompanySummary {
    pub id: i64,
    pub company_name: String,
    pub owner: Option<String>,
    pub address: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
}

impl From<Company> for CompanySummary {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            company_name: company.company_name,
            owner: company.owner,
            address: company.address,
            update_time: company.update_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompanyDetailResponse {
    pub id: i64,
    pub company_name: String,
    pub owner: Option<String>,
    pub address: Option<String>,
    pub update_time: Option<DateTime<Utc>>,
    pub company_desc: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub code: Option<String>,
    pub uuid: Option<String>,
    pub last_sync_at: DateTime<Utc>,
}

impl From<Company> for CompanyDetailResponse {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            company_name: company.company_name,
            owner: company.owner,
            address: company.address,
            update_time: company.update_time,
            company_desc: company.company_desc,
            create_time: company.create_time,
            code: company.code,
            uuid: company.uuid,
            last_sync_at: company.last_sync_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompanyListResponse {
    pub companies: Vec<CompanySummary>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub query: String,
    pub search_type: String,
    pub processing_time_ms: f64,
}
