use compsync_common::error::CompsyncError;
use compsync_db::companies::models::{CompanySearch, SearchType};
use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;
pub const MAX_QUERY_LEN: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct CompanySearchParams {
    pub query: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search_type: Option<String>,
}

impl CompanySearchParams {
    /// Validate into a repository search. `require_query` is set by the
    /// dedicated search endpoint.
    pub fn into_search(self, require_query: bool) -> Result<CompanySearch, CompsyncError> {
        let query = self.query.unwrap_or_default().trim().to_string();
        if require_query && query.is_empty() {
            return Err(CompsyncError::Validation("query must not be empty".to_string()));
        }
        if query.chars().count() > MAX_QUERY_LEN {
            return Err(CompsyncError::Validation(format!(
                "query must be at most {MAX_QUERY_LEN} characters"
            )));
        }

        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(CompsyncError::Validation(format!(
                "page must be >= 1, got: {page}"
            )));
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(CompsyncError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got: {page_size}"
            )));
        }

        let search_type = match self.search_type.as_deref() {
            None => SearchType::Auto,
            Some(raw) => raw.parse::<SearchType>().map_err(CompsyncError::Validation)?,
        };

        Ok(CompanySearch {
            query,
            search_type,
            page,
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_params_missing() {
        let search = CompanySearchParams::default().into_search(false).unwrap();
        assert_eq!(search.page, 1);
        assert_eq!(search.page_size, 50);
        assert_eq!(search.search_type, SearchType::Auto);
        assert!(search.query.is_empty());
    }

    #[test]
    fn page_size_bounds_are_enforced() {
        for bad in [0, 201, -5] {
            let params = CompanySearchParams {
                page_size: Some(bad),
                ..Default::default()
            };
            assert!(params.into_search(false).is_err(), "page_size {bad}");
        }
        let params = CompanySearchParams {
            page_size: Some(200),
            ..Default::default()
        };
        assert!(params.into_search(false).is_ok());
    }

    #[test]
    fn page_must_be_positive() {
        let params = CompanySearchParams {
            page: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            params.into_search(false),
            Err(CompsyncError::Validation(_))
        ));
    }

    #[test]
    fn unknown_search_type_is_rejected() {
        let params = CompanySearchParams {
            search_type: Some("regex".to_string()),
            ..Default::default()
        };
        let err = params.into_search(false).unwrap_err();
        assert!(err.to_string().contains("regex"));
    }

    #[test]
    fn search_endpoint_requires_query() {
        let blank = CompanySearchParams {
            query: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(blank.into_search(true).is_err());

        let long = CompanySearchParams {
            query: Some("x".repeat(101)),
            ..Default::default()
        };
        assert!(long.into_search(true).is_err());

        let ok = CompanySearchParams {
            query: Some(" acme ".to_string()),
            search_type: Some("fts".to_string()),
            ..Default::default()
        };
        let search = ok.into_search(true).unwrap();
        assert_eq!(search.query, "acme");
        assert_eq!(search.search_type, SearchType::Fts);
    }
}
