//! In-memory repositories used when the warehouse is unreachable.
//!
//! Output is a pure function of the request: the RNG is seeded from an FNV-1a
//! hash of the request fields, so repeated requests (and batch walks over the
//! same request) see identical records. One record per calendar day starting
//! at the range start, at most [`MAX_SYNTHETIC_RECORDS`].

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::fund_mapping::FundColumnMapping;
use crate::models::{DataField, DataRecord, Fund, MarketDataRecord, MarketDataRequest, RawDataRequest, Security};
use crate::repo::{MarketDataRepository, RawDataRepository, RepoError};

/// Upper bound on records per synthetic fetch.
pub const MAX_SYNTHETIC_RECORDS: usize = 50;

/// Catalogs listed by the synthetic raw repository; mapped and unmapped ones.
pub const SYNTHETIC_CATEGORIES: &[&str] = &[
    "CITCO_NAV",
    "HAAS_FUND_PRICE",
    "SAMPLE_CATEGORY_1",
    "BALANCE_SHEET",
    "TRANSACTIONS",
];

/// Funds offered for every mapped catalog.
pub const SYNTHETIC_FUNDS: &[&str] = &[
    "GLOBAL_EQUITY_FUND",
    "FIXED_INCOME_FUND",
    "EMERGING_MARKETS_FUND",
    "TECHNOLOGY_FUND",
    "REAL_ESTATE_FUND",
];

/// Securities listed by the synthetic market repository.
pub const SYNTHETIC_SECURITIES: &[&str] = &[
    "AAPL US Equity",
    "MSFT US Equity",
    "GOOGL US Equity",
    "TSLA US Equity",
    "AMZN US Equity",
];

/// Fields offered for every synthetic security.
pub const SYNTHETIC_FIELDS: &[&str] = &["PX_LAST", "PX_OPEN", "PX_HIGH", "PX_LOW", "PX_VOLUME", "MARKET_CAP"];

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable across runs and platforms, unlike `DefaultHasher`.
fn seed(parts: &[&str]) -> u64 {
    let mut h = FNV_OFFSET;
    for part in parts {
        for b in part.bytes().chain(std::iter::once(0x1f)) {
            h ^= u64::from(b);
            h = h.wrapping_mul(FNV_PRIME);
        }
    }
    h
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Random-walk rows for raw catalogs.
pub struct SyntheticRawDataRepository {
    mapping: Arc<FundColumnMapping>,
}

impl SyntheticRawDataRepository {
    /// Repository that treats `mapping`'s catalogs as fund-filtered.
    pub fn new(mapping: Arc<FundColumnMapping>) -> Self {
        Self { mapping }
    }
}

impl RawDataRepository for SyntheticRawDataRepository {
    fn list_categories(&self) -> Result<Vec<String>, RepoError> {
        Ok(SYNTHETIC_CATEGORIES.iter().map(|c| c.to_string()).collect())
    }

    fn list_funds(&self, catalog: &str) -> Result<Vec<Fund>, RepoError> {
        if !self.mapping.has_fund_filtering(catalog) {
            return Ok(Vec::new());
        }
        Ok(SYNTHETIC_FUNDS
            .iter()
            .map(|f| Fund {
                fund: f.to_string(),
                catalog: catalog.to_string(),
            })
            .collect())
    }

    fn fetch(&self, request: &RawDataRequest) -> Result<Vec<DataRecord>, RepoError> {
        let mapped = self.mapping.has_fund_filtering(&request.catalog);
        let fund = if mapped { request.fund.as_str() } else { "" };
        let start = request.dates.start().to_string();
        let end = request.dates.end().to_string();
        let mut rng = StdRng::seed_from_u64(seed(&["raw", &request.catalog, fund, &start, &end]));

        let mut value = 100.0_f64;
        let records: Vec<DataRecord> = request
            .dates
            .days()
            .take(MAX_SYNTHETIC_RECORDS)
            .map(|day| {
                value += rng.random_range(-5.0..=5.0);
                let mut rec = DataRecord::with_capacity(7);
                rec.insert("date".into(), json!(day.format("%Y-%m-%d").to_string()));
                if mapped {
                    rec.insert("fund".into(), json!(fund));
                }
                rec.insert("catalog".into(), json!(request.catalog));
                rec.insert("value".into(), json!(round2(value)));
                rec.insert("nav".into(), json!(round2(value * 1.1)));
                rec.insert("shares".into(), json!(rng.random_range(1000..=10_000_u32)));
                rec.insert("currency".into(), json!("USD"));
                rec
            })
            .collect();
        Ok(records)
    }
}

/// Per-field price/volume series for securities.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticMarketDataRepository;

impl SyntheticMarketDataRepository {
    fn observation(rng: &mut StdRng, field: &str, base: f64) -> serde_json::Value {
        match field {
            "PX_LAST" => json!(round2(base + rng.random_range(-10.0..=10.0))),
            "PX_VOLUME" => json!(rng.random_range(1_000_000..=50_000_000_u64)),
            "MARKET_CAP" => json!(rng.random_range(100_000_000_000..=3_000_000_000_000_u64)),
            _ => json!(round2(base + rng.random_range(-15.0..=15.0))),
        }
    }
}

impl MarketDataRepository for SyntheticMarketDataRepository {
    fn list_securities(&self) -> Result<Vec<Security>, RepoError> {
        Ok(SYNTHETIC_SECURITIES
            .iter()
            .map(|s| Security {
                security: s.to_string(),
            })
            .collect())
    }

    fn list_fields(&self, security: &str) -> Result<Vec<DataField>, RepoError> {
        Ok(SYNTHETIC_FIELDS
            .iter()
            .map(|f| DataField {
                field: f.to_string(),
                security: security.to_string(),
            })
            .collect())
    }

    fn fetch(&self, request: &MarketDataRequest) -> Result<Vec<MarketDataRecord>, RepoError> {
        let start = request.dates.start().to_string();
        let end = request.dates.end().to_string();
        let mut rng = StdRng::seed_from_u64(seed(&["market", &request.security, &request.field, &start, &end]));

        let base = if request.security.starts_with("AAPL") {
            150.0
        } else {
            rng.random_range(50.0..500.0)
        };

        Ok(request
            .dates
            .days()
            .take(MAX_SYNTHETIC_RECORDS)
            .map(|date| MarketDataRecord {
                security: request.security.clone(),
                field: request.field.clone(),
                date,
                value: Self::observation(&mut rng, &request.field, base),
            })
            .collect())
    }
}
