//! Repository interfaces and their live/synthetic implementations.
//!
//! Two domains, one trait each:
//! - [`RawDataRepository`]: catalogs, funds, raw rows
//! - [`MarketDataRepository`]: securities, fields, observations
//!
//! Live implementations ([`sql`]) go through a [`SqlExecutor`]; the synthetic
//! ones ([`synthetic`]) generate deterministic data in memory. Which one a
//! service gets is decided once at startup by [`resolve::RepositoryResolver`].
//!
//! All methods are synchronous. Async callers run them on the blocking pool.

use thiserror::Error;

use crate::environment::EnvironmentTag;
use crate::models::{DataField, DataRecord, Fund, MarketDataRecord, MarketDataRequest, RawDataRequest, Security};
use crate::query::BuiltQuery;

pub mod resolve;
pub mod sql;
pub mod synthetic;

pub use resolve::{RepositoryResolver, Resolved};
pub use sql::{SqlMarketDataRepository, SqlRawDataRepository};
pub use synthetic::{SyntheticMarketDataRepository, SyntheticRawDataRepository};

/// Failure of the store underneath a live repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be checked out of the pool.
    #[error("connection pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    /// The database rejected or failed the statement.
    #[error("database: {0}")]
    Database(#[from] diesel::result::Error),
    /// A row did not decode into the expected shape.
    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Repository-level failure.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The catalog is neither mapped nor listed by the warehouse.
    #[error("unknown catalog {0:?}")]
    UnknownCatalog(String),
    /// Query execution failed.
    #[error("query failed: {0}")]
    Query(#[from] StoreError),
}

/// A live backend could not be established or did not answer its probe.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    /// Neither `DATABASE_URL` nor the config names a target for the environment.
    #[error("no database configured for the {0} environment")]
    NoTarget(EnvironmentTag),
    /// The pool could not open its connections.
    #[error("cannot open connection pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    /// The cheap listing used as a probe failed.
    #[error("probe failed: {0}")]
    Probe(#[source] RepoError),
    /// An earlier connection attempt of the same resolver failed.
    #[error("{0}")]
    Unavailable(String),
}

/// Which kind of repository is serving a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The warehouse database.
    Live,
    /// In-memory generated data.
    Synthetic,
}

impl Backend {
    /// Lowercase name, as sent in the `X-Data-Source` header.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs built queries.
///
/// The production executor is a diesel PostgreSQL pool ([`crate::db::PgExecutor`]).
pub trait SqlExecutor: Send + Sync {
    /// Runs a query projecting one text column aliased
    /// [`VALUE_COLUMN`](crate::query::VALUE_COLUMN).
    fn query_values(&self, query: &BuiltQuery) -> Result<Vec<String>, StoreError>;

    /// Runs a query projecting one JSON object per row, aliased
    /// [`RECORD_COLUMN`](crate::query::RECORD_COLUMN).
    fn query_records(&self, query: &BuiltQuery) -> Result<Vec<DataRecord>, StoreError>;
}

/// Access to raw warehouse catalogs.
pub trait RawDataRepository: Send + Sync {
    /// Catalogs currently available.
    fn list_categories(&self) -> Result<Vec<String>, RepoError>;

    /// Funds of `catalog`; empty when the catalog has no fund column.
    fn list_funds(&self, catalog: &str) -> Result<Vec<Fund>, RepoError>;

    /// Rows of the requested catalog. The fund is ignored for unmapped catalogs.
    fn fetch(&self, request: &RawDataRequest) -> Result<Vec<DataRecord>, RepoError>;
}

/// Access to market observations.
pub trait MarketDataRepository: Send + Sync {
    /// Securities with at least one observation.
    fn list_securities(&self) -> Result<Vec<Security>, RepoError>;

    /// Fields published for `security`.
    fn list_fields(&self, security: &str) -> Result<Vec<DataField>, RepoError>;

    /// Observations of one field, ascending by date.
    fn fetch(&self, request: &MarketDataRequest) -> Result<Vec<MarketDataRecord>, RepoError>;
}
