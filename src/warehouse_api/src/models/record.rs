//! Schema-free records and inclusive calendar ranges.

use chrono::{Days, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row of whatever table was queried: column name → JSON value.
///
/// Insertion order is the column order of the source table and is kept all
/// the way to the JSON response.
pub type DataRecord = IndexMap<String, serde_json::Value>;

/// A range whose end precedes its start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("start date {start} is after end date {end}")]
pub struct DateRangeError {
    /// Requested start.
    pub start: NaiveDate,
    /// Requested end.
    pub end: NaiveDate,
}

/// Calendar range, inclusive on both ends; never inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawRange> for DateRange {
    type Error = DateRangeError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Builds a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive start.
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Inclusive end.
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered (at least 1).
    pub fn num_days(&self) -> u64 {
        // start <= end, so the difference is non-negative
        (self.end - self.start).num_days().unsigned_abs() + 1
    }

    /// Whether `date` falls inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Days of the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        std::iter::successors(Some(self.start), |d| d.checked_add_days(Days::new(1)))
            .take_while(move |d| *d <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn single_day_range_is_valid() {
        let r = DateRange::new(d(2024, 2, 29), d(2024, 2, 29)).unwrap();
        assert_eq!(r.num_days(), 1);
        assert_eq!(r.days().collect::<Vec<_>>(), vec![d(2024, 2, 29)]);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(d(2024, 3, 2), d(2024, 3, 1)).unwrap_err();
        assert_eq!(err.to_string(), "start date 2024-03-02 is after end date 2024-03-01");
    }

    #[test]
    fn days_walk_across_month_ends() {
        let r = DateRange::new(d(2023, 12, 30), d(2024, 1, 2)).unwrap();
        let days: Vec<_> = r.days().collect();
        assert_eq!(days.len() as u64, r.num_days());
        assert_eq!(days.first(), Some(&d(2023, 12, 30)));
        assert_eq!(days.last(), Some(&d(2024, 1, 2)));
        assert!(days.iter().all(|x| r.contains(*x)));
    }

    #[test]
    fn deserialize_rejects_inverted_range() {
        let ok: DateRange =
            serde_json::from_str(r#"{"start":"2024-01-01","end":"2024-01-31"}"#).unwrap();
        assert_eq!(ok.num_days(), 31);
        assert!(serde_json::from_str::<DateRange>(r#"{"start":"2024-02-01","end":"2024-01-31"}"#).is_err());
    }
}
