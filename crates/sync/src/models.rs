use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use compsync_db::companies::models::NewCompany;
use serde::{Deserialize, Serialize};

/// Response wrapper used by the company list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

/// The `data` object of one list page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPage {
    #[serde(default)]
    pub total_page: i64,
    pub total: i64,
    #[serde(default)]
    pub rows: Vec<ExternalCompany>,
}

/// A company as the source API sends it. Everything except `id` is loose so
/// one bad record fails on its own during mapping instead of sinking the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCompany {
    pub id: i64,
    pub company_name: Option<String>,
    pub owner: Option<String>,
    pub company_desc: Option<String>,
    /// Spelled this way by the source.
    pub adress: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub code: Option<String>,
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("company {id}: missing required field {field}")]
    MissingField { id: i64, field: &'static str },

    #[error("company {id}: unparseable {field} {value:?}")]
    InvalidTimestamp {
        id: i64,
        field: &'static str,
        value: String,
    },
}

impl ExternalCompany {
    /// Map to the internal shape. Pure: no clock, no I/O.
    pub fn to_new_company(&self) -> Result<NewCompany, TransformError> {
        let company_name = self
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(TransformError::MissingField {
                id: self.id,
                field: "companyName",
            })?
            .to_string();

        Ok(NewCompany {
            id: self.id,
            company_name,
            owner: self.owner.clone(),
            company_desc: self.company_desc.clone(),
            address: self.adress.clone().unwrap_or_default(),
            create_time: parse_field(self.id, "createTime", self.create_time.as_deref())?,
            update_time: parse_field(self.id, "updateTime", self.update_time.as_deref())?,
            code: self.code.clone(),
            uuid: self.uuid.clone(),
        })
    }
}

fn parse_field(
    id: i64,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, TransformError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_source_timestamp(value)
            .map(Some)
            .ok_or_else(|| TransformError::InvalidTimestamp {
                id,
                field,
                value: value.to_string(),
            }),
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a source timestamp. Values without an offset are taken as UTC.
pub fn parse_source_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn external(id: i64) -> ExternalCompany {
        ExternalCompany {
            id,
            company_name: Some("Acme Ltd".to_string()),
            owner: Some("Li Si".to_string()),
            company_desc: Some("makes anvils".to_string()),
            adress: Some("88 Nanjing Road".to_string()),
            create_time: Some("2023-01-05 08:30:00".to_string()),
            update_time: Some("2024-03-01T12:00:00".to_string()),
            code: Some("AC-1".to_string()),
            uuid: Some("c0ffee".to_string()),
        }
    }

    #[test]
    fn deserializes_source_field_names() {
        let json = serde_json::json!({
            "id": 7,
            "companyName": "Acme Ltd",
            "companyDesc": "desc",
            "adress": "somewhere",
            "createTime": "2023-01-05 08:30:00",
            "updateTime": null,
            "code": "X",
            "uuid": "u-1"
        });
        let company: ExternalCompany = serde_json::from_value(json).unwrap();
        assert_eq!(company.id, 7);
        assert_eq!(company.company_name.as_deref(), Some("Acme Ltd"));
        assert_eq!(company.adress.as_deref(), Some("somewhere"));
        assert!(company.update_time.is_none());
    }

    #[test]
    fn maps_address_rename() {
        let mapped = external(1).to_new_company().unwrap();
        assert_eq!(mapped.address, "88 Nanjing Road");
        assert_eq!(mapped.company_name, "Acme Ltd");
        assert_eq!(mapped.code.as_deref(), Some("AC-1"));
    }

    #[test]
    fn missing_address_becomes_empty_string() {
        let mut company = external(2);
        company.adress = None;
        assert_eq!(company.to_new_company().unwrap().address, "");
    }

    #[test]
    fn parses_space_and_t_separated_timestamps() {
        let mapped = external(3).to_new_company().unwrap();
        assert_eq!(
            mapped.create_time,
            Some(Utc.with_ymd_and_hms(2023, 1, 5, 8, 30, 0).unwrap())
        );
        assert_eq!(
            mapped.update_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn rfc3339_offset_is_normalised_to_utc() {
        let parsed = parse_source_timestamp("2024-03-01T20:00:00+08:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn date_only_is_midnight() {
        let parsed = parse_source_timestamp("2024-03-01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn empty_timestamp_is_absent() {
        let mut company = external(4);
        company.create_time = Some(String::new());
        company.update_time = None;
        let mapped = company.to_new_company().unwrap();
        assert!(mapped.create_time.is_none());
        assert!(mapped.update_time.is_none());
    }

    #[test]
    fn garbage_timestamp_is_a_record_error() {
        let mut company = external(5);
        company.update_time = Some("yesterday-ish".to_string());
        let err = company.to_new_company().unwrap_err();
        assert_eq!(
            err,
            TransformError::InvalidTimestamp {
                id: 5,
                field: "updateTime",
                value: "yesterday-ish".to_string(),
            }
        );
    }

    #[test]
    fn blank_name_is_a_record_error() {
        let mut company = external(6);
        company.company_name = Some("   ".to_string());
        assert!(matches!(
            company.to_new_company(),
            Err(TransformError::MissingField { id: 6, .. })
        ));
    }
}
