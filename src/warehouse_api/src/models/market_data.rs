//! Market data: securities, their fields, and daily observations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::record::{DataRecord, DateRange};
use crate::query::{SqlParam, SqlValue};

/// A security available in the market-data table (e.g. "AAPL US Equity").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// Security identifier.
    pub security: String,
}

/// A field published for one security.
///
/// Field names are not globally unique; they only mean something together
/// with their security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    /// Field mnemonic (e.g. "PX_LAST").
    pub field: String,
    /// Security the field belongs to.
    pub security: String,
}

/// Filter criteria for one market-data fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataRequest {
    /// Security identifier.
    pub security: String,
    /// Field mnemonic.
    pub field: String,
    /// Inclusive observation-date range.
    pub dates: DateRange,
}

impl MarketDataRequest {
    /// Value-level query parameters (`security`, `field`, `start`, `end`).
    pub fn to_query_params(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::new("security", SqlValue::Text(self.security.clone())),
            SqlParam::new("field", SqlValue::Text(self.field.clone())),
            SqlParam::new("start", SqlValue::Date(self.dates.start())),
            SqlParam::new("end", SqlValue::Date(self.dates.end())),
        ]
    }
}

/// One observation of a security field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataRecord {
    /// Security identifier.
    pub security: String,
    /// Field mnemonic.
    pub field: String,
    /// Observation date.
    pub date: NaiveDate,
    /// Observed value; numeric for prices, but the table does not promise a type.
    pub value: serde_json::Value,
}

impl MarketDataRecord {
    /// Flattens into a [`DataRecord`] with columns `security, field, date, value`.
    pub fn into_record(self) -> DataRecord {
        let mut record = DataRecord::with_capacity(4);
        record.insert("security".into(), self.security.into());
        record.insert("field".into(), self.field.into());
        record.insert("date".into(), self.date.format("%Y-%m-%d").to_string().into());
        record.insert("value".into(), self.value);
        record
    }
}
