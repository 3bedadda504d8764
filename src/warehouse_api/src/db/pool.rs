//! PostgreSQL connection pool and query execution.
//!
//! [`PgExecutor::connect`] opens an r2d2 pool of diesel [`PgConnection`]s and
//! fails when the first connection cannot be established within
//! [`PoolSettings::connection_timeout`]; that failure is what the repository
//! resolver treats as "warehouse unreachable".
//!
//! Queries are run as raw SQL with positional binds. Every query projects one
//! text column, so two row shapes cover all of them.

use std::time::Duration;

use diesel::pg::{Pg, PgConnection};
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use diesel::sql_types::{Date, Text};
use diesel::{QueryableByName, RunQueryDsl, sql_query};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::models::DataRecord;
use crate::query::{BuiltQuery, SqlValue};
use crate::repo::{SqlExecutor, StoreError};

/// Pool sizing and checkout timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum open connections.
    pub max_size: u32,
    /// How long a checkout (and the initial connect) may wait.
    pub connection_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(QueryableByName)]
struct ValueRow {
    #[diesel(sql_type = Text)]
    value: String,
}

#[derive(QueryableByName)]
struct RecordRow {
    #[diesel(sql_type = Text)]
    record: String,
}

/// [`SqlExecutor`] over a pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PgExecutor {
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl PgExecutor {
    /// Opens the pool. Fails when no connection can be made in time.
    pub fn connect(url: &SecretString, settings: PoolSettings) -> Result<Self, PoolError> {
        let manager = ConnectionManager::<PgConnection>::new(url.expose_secret());
        let pool = Pool::builder()
            .max_size(settings.max_size)
            .connection_timeout(settings.connection_timeout)
            .build(manager)?;
        debug!(max_size = settings.max_size, "opened warehouse connection pool");
        Ok(Self { pool })
    }
}

fn bound(query: &BuiltQuery) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
    let mut q = sql_query(query.text.clone()).into_boxed::<Pg>();
    for param in &query.params {
        q = match &param.value {
            SqlValue::Text(s) => q.bind::<Text, _>(s.clone()),
            SqlValue::Date(d) => q.bind::<Date, _>(*d),
        };
    }
    q
}

impl SqlExecutor for PgExecutor {
    fn query_values(&self, query: &BuiltQuery) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<ValueRow> = bound(query).load(&mut conn)?;
        Ok(rows.into_iter().map(|r| r.value).collect())
    }

    fn query_records(&self, query: &BuiltQuery) -> Result<Vec<DataRecord>, StoreError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<RecordRow> = bound(query).load(&mut conn)?;
        rows.into_iter()
            .map(|r| serde_json::from_str::<DataRecord>(&r.record).map_err(StoreError::from))
            .collect()
    }
}
