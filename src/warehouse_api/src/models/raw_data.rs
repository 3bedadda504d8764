//! Raw warehouse data: catalogs (tables), funds, and download requests.

use serde::{Deserialize, Serialize};

use crate::models::record::DateRange;
use crate::query::{SqlParam, SqlValue};

/// A fund within one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fund {
    /// Fund identifier as stored in the catalog's fund column.
    pub fund: String,
    /// Catalog the fund was listed from.
    pub catalog: String,
}

/// Filter criteria for one raw-data fetch.
///
/// `fund` is the empty string for catalogs without a fund-filter column;
/// that is a valid request, not a missing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataRequest {
    /// Catalog (table) to read.
    pub catalog: String,
    /// Fund to scope to; ignored for catalogs without a fund column.
    pub fund: String,
    /// Inclusive load-date range.
    pub dates: DateRange,
}

impl RawDataRequest {
    /// Value-level query parameters (`fund`, `start`, `end`), in that order.
    ///
    /// The query builder drops `fund` for catalogs without a fund column.
    pub fn to_query_params(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::new("fund", SqlValue::Text(self.fund.clone())),
            SqlParam::new("start", SqlValue::Date(self.dates.start())),
            SqlParam::new("end", SqlValue::Date(self.dates.end())),
        ]
    }
}
