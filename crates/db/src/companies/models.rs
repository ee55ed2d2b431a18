use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A company row as persisted in `companies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub company_name: String,
    pub owner: Option<String>,
    pub company_desc: Option<String>,
    pub address: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub code: Option<String>,
    pub uuid: Option<String>,
    pub last_sync_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A company as produced by the source mapping, before the store assigns
/// `last_sync_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompany {
    pub id: i64,
    pub company_name: String,
    pub owner: Option<String>,
    pub company_desc: Option<String>,
    pub address: String,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub code: Option<String>,
    pub uuid: Option<String>,
}

impl NewCompany {
    /// The row this record becomes once written at `synced_at`.
    pub fn into_company(self, synced_at: DateTime<Utc>) -> Company {
        Company {
            id: self.id,
            company_name: self.company_name,
            owner: self.owner,
            company_desc: self.company_desc,
            address: Some(self.address),
            create_time: self.create_time,
            update_time: self.update_time,
            code: self.code,
            uuid: self.uuid,
            last_sync_at: synced_at,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Auto,
    Fts,
    Like,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Fts => "fts",
            Self::Like => "like",
        }
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(Self::Auto),
            "fts" => Ok(Self::Fts),
            "like" => Ok(Self::Like),
            _ => Err(format!(
                "search_type must be 'auto', 'fts', or 'like', got: {value}"
            )),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated page request against the active companies.
#[derive(Debug, Clone)]
pub struct CompanySearch {
    pub query: String,
    pub search_type: SearchType,
    pub page: i64,
    pub page_size: i64,
}

impl CompanySearch {
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0) * self.page_size
    }
}

/// Number of pages needed to show `total` rows, zero when there are none.
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 || page_size <= 0 {
        return 0;
    }
    (total + page_size - 1) / page_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_type_round_trips_through_str() {
        for st in [SearchType::Auto, SearchType::Fts, SearchType::Like] {
            assert_eq!(st.as_str().parse::<SearchType>().unwrap(), st);
        }
        let err = "regex".parse::<SearchType>().unwrap_err();
        assert!(err.contains("regex"));
    }

    #[test]
    fn offset_is_zero_based() {
        let search = CompanySearch {
            query: String::new(),
            search_type: SearchType::Auto,
            page: 3,
            page_size: 20,
        };
        assert_eq!(search.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 50), 0);
        assert_eq!(total_pages(1, 50), 1);
        assert_eq!(total_pages(100, 50), 2);
        assert_eq!(total_pages(101, 50), 3);
    }

    #[test]
    fn new_company_becomes_active_row() {
        let now = Utc::now();
        let row = NewCompany {
            id: 9,
            company_name: "Acme".to_string(),
            owner: None,
            company_desc: None,
            address: String::new(),
            create_time: None,
            update_time: None,
            code: None,
            uuid: None,
        }
        .into_company(now);
        assert!(row.is_active);
        assert_eq!(row.address.as_deref(), Some(""));
        assert_eq!(row.last_sync_at, now);
    }
}
