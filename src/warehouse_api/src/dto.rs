//! Download payloads as sent by the spreadsheet client, and their validation.
//!
//! Payload fields are all optional at decode time so that a missing field
//! produces a [`ValidationError`] naming it, instead of a generic decode error.
//! Field names are snake_case; camelCase aliases are accepted.

use std::num::NonZeroUsize;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::fund_mapping::FundColumnMapping;
use crate::models::{DateRange, DateRangeError, MarketDataRequest, RawDataRequest};
use crate::paginate::DEFAULT_BATCH_SIZE;

/// A request rejected before it reaches a repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Required field absent or blank.
    #[error("missing required field: {0}")]
    Missing(&'static str),
    /// Date not in `YYYY-MM-DD` form.
    #[error("{field} must be a date in YYYY-MM-DD format, got {value:?}")]
    InvalidDate {
        /// Offending field.
        field: &'static str,
        /// Value as received.
        value: String,
    },
    /// Start after end.
    #[error(transparent)]
    InvertedRange(#[from] DateRangeError),
    /// Mapped catalog without a fund.
    #[error("fund is required for catalog {0}")]
    FundRequired(String),
    /// `batch_size` below one.
    #[error("batch_size must be at least 1, got {0}")]
    BatchSize(i64),
    /// Negative `batch_id`.
    #[error("batch_id must not be negative, got {0}")]
    BatchId(i64),
}

/// Body of `POST /api/raw-data/download`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawDataPayload {
    /// Catalog (table) name.
    pub catalog: Option<String>,
    /// Fund; required for mapped catalogs only.
    pub fund: Option<String>,
    /// Inclusive start date.
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    /// Inclusive end date.
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
    /// Records per batch.
    #[serde(alias = "batchSize")]
    pub batch_size: Option<i64>,
    /// Zero-based batch; its presence selects batched mode.
    #[serde(alias = "batchId")]
    pub batch_id: Option<i64>,
}

/// Body of `POST /api/market-data/download`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MarketDataPayload {
    /// Security identifier.
    pub security: Option<String>,
    /// Field mnemonic.
    pub field: Option<String>,
    /// Inclusive start date.
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    /// Inclusive end date.
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
    /// Records per batch.
    #[serde(alias = "batchSize")]
    pub batch_size: Option<i64>,
    /// Zero-based batch; its presence selects batched mode.
    #[serde(alias = "batchId")]
    pub batch_id: Option<i64>,
}

/// Which batch to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpec {
    /// Zero-based batch index.
    pub batch_id: usize,
    /// Records per batch.
    pub batch_size: NonZeroUsize,
}

/// A validated download: the domain request plus optional batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download<R> {
    /// Domain request.
    pub request: R,
    /// `Some` in batched mode.
    pub batch: Option<BatchSpec>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::Missing(field))
}

/// Parses `YYYY-MM-DD`; a longer datetime is truncated to its date part.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        field,
        value: raw.to_string(),
    };
    let raw_trimmed = raw.trim();
    let date_part = match raw_trimmed.get(..10) {
        Some(head) if raw_trimmed.len() == 10 => head,
        Some(head) if matches!(raw_trimmed.as_bytes().get(10), Some(b'T' | b' ')) => head,
        _ => return Err(invalid()),
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())
}

fn dates(start: Option<String>, end: Option<String>) -> Result<DateRange, ValidationError> {
    let start = required(start, "start_date")?;
    let end = required(end, "end_date")?;
    let range = DateRange::new(parse_date("start_date", &start)?, parse_date("end_date", &end)?)?;
    Ok(range)
}

fn batch(batch_id: Option<i64>, batch_size: Option<i64>) -> Result<Option<BatchSpec>, ValidationError> {
    let Some(id) = batch_id else {
        return Ok(None);
    };
    let batch_id = usize::try_from(id).map_err(|_| ValidationError::BatchId(id))?;
    let batch_size = match batch_size {
        None => DEFAULT_BATCH_SIZE,
        Some(n) => usize::try_from(n)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(ValidationError::BatchSize(n))?,
    };
    Ok(Some(BatchSpec {
        batch_id,
        batch_size,
    }))
}

/// Validates a raw-data download.
///
/// The fund is required for catalogs with a fund column and dropped (set to
/// the empty string) for all others.
pub fn validate_raw(
    payload: RawDataPayload,
    mapping: &FundColumnMapping,
) -> Result<Download<RawDataRequest>, ValidationError> {
    let catalog = required(payload.catalog, "catalog")?;
    let dates = dates(payload.start_date, payload.end_date)?;

    let fund = if mapping.has_fund_filtering(&catalog) {
        payload
            .fund
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ValidationError::FundRequired(catalog.clone()))?
    } else {
        String::new()
    };

    Ok(Download {
        request: RawDataRequest {
            catalog,
            fund,
            dates,
        },
        batch: batch(payload.batch_id, payload.batch_size)?,
    })
}

/// Validates a market-data download.
pub fn validate_market(payload: MarketDataPayload) -> Result<Download<MarketDataRequest>, ValidationError> {
    let security = required(payload.security, "security")?;
    let field = required(payload.field, "field")?;
    let dates = dates(payload.start_date, payload.end_date)?;
    Ok(Download {
        request: MarketDataRequest {
            security,
            field,
            dates,
        },
        batch: batch(payload.batch_id, payload.batch_size)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SqlValue;

    fn raw(catalog: &str, fund: Option<&str>) -> RawDataPayload {
        RawDataPayload {
            catalog: Some(catalog.into()),
            fund: fund.map(Into::into),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-31".into()),
            ..Default::default()
        }
    }

    #[test]
    fn mapped_catalog_requires_a_fund() {
        let m = FundColumnMapping::builtin();
        for fund in [None, Some(""), Some("   ")] {
            assert_eq!(
                validate_raw(raw("CITCO_NAV", fund), &m).unwrap_err(),
                ValidationError::FundRequired("CITCO_NAV".into())
            );
        }
        let ok = validate_raw(raw("CITCO_NAV", Some(" ALPHA ")), &m).unwrap();
        assert_eq!(ok.request.fund, "ALPHA");
    }

    #[test]
    fn unmapped_catalog_drops_the_fund() {
        let m = FundColumnMapping::builtin();
        let ok = validate_raw(raw("BALANCE_SHEET", Some("ALPHA")), &m).unwrap();
        assert_eq!(ok.request.fund, "");
        assert!(ok.batch.is_none());
    }

    #[test]
    fn payload_to_query_params_keeps_fund_and_dates() {
        let m = FundColumnMapping::builtin();
        let d = validate_raw(raw("HAAS_FUND_PRICE", Some("BETA")), &m).unwrap();
        let params = d.request.to_query_params();
        assert_eq!(params[0].value, SqlValue::Text("BETA".into()));
        assert_eq!(params[1].value, SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert_eq!(params[2].value, SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
    }

    #[test]
    fn missing_fields_are_named() {
        let m = FundColumnMapping::builtin();
        let mut p = raw("CITCO_NAV", Some("A"));
        p.catalog = None;
        assert_eq!(validate_raw(p, &m).unwrap_err(), ValidationError::Missing("catalog"));

        let err = validate_market(MarketDataPayload {
            security: Some("AAPL US Equity".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ValidationError::Missing("field"));
    }

    #[test]
    fn dates_accept_datetime_prefix_only() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("start_date", "2024-03-05").unwrap(), d);
        assert_eq!(parse_date("start_date", "2024-03-05T13:45:00Z").unwrap(), d);
        assert_eq!(parse_date("start_date", "2024-03-05 00:00:00").unwrap(), d);
        for bad in ["2024-3-5", "05/03/2024", "2024-03-05x", "2024-02-30", ""] {
            assert!(parse_date("start_date", bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let m = FundColumnMapping::builtin();
        let mut p = raw("BALANCE_SHEET", None);
        p.start_date = Some("2024-02-01".into());
        assert!(matches!(
            validate_raw(p, &m).unwrap_err(),
            ValidationError::InvertedRange(_)
        ));
    }

    #[test]
    fn batch_id_zero_selects_batched_mode() {
        let m = FundColumnMapping::builtin();
        let mut p = raw("BALANCE_SHEET", None);
        p.batch_id = Some(0);
        let d = validate_raw(p.clone(), &m).unwrap();
        assert_eq!(
            d.batch,
            Some(BatchSpec {
                batch_id: 0,
                batch_size: DEFAULT_BATCH_SIZE
            })
        );

        p.batch_size = Some(0);
        assert_eq!(validate_raw(p.clone(), &m).unwrap_err(), ValidationError::BatchSize(0));
        p.batch_size = Some(10);
        p.batch_id = Some(-1);
        assert_eq!(validate_raw(p, &m).unwrap_err(), ValidationError::BatchId(-1));
    }

    #[test]
    fn camel_case_aliases_decode() {
        let p: MarketDataPayload = serde_json::from_str(
            r#"{"security":"AAPL US Equity","field":"PX_LAST","startDate":"2024-01-01","endDate":"2024-01-02","batchId":1,"batchSize":5}"#,
        )
        .unwrap();
        let d = validate_market(p).unwrap();
        assert_eq!(d.request.dates.num_days(), 2);
        assert_eq!(d.batch.unwrap().batch_size.get(), 5);
    }
}
