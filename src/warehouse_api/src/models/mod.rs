//! Domain entities shared by repositories, services and the HTTP layer.
//!
//! - [`record`]: the schema-free [`record::DataRecord`] and the inclusive [`record::DateRange`]
//! - [`raw_data`]: catalogs, funds and raw-data requests
//! - [`market_data`]: securities, fields and market-data requests/records

pub mod market_data;
pub mod raw_data;
pub mod record;

pub use market_data::{DataField, MarketDataRecord, MarketDataRequest, Security};
pub use raw_data::{Fund, RawDataRequest};
pub use record::{DataRecord, DateRange, DateRangeError};
