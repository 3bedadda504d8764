//! Live repositories over a [`SqlExecutor`].

use std::sync::Arc;

use tracing::{debug, error};

use crate::fund_mapping::FundColumnMapping;
use crate::ident::TrustedIdent;
use crate::models::{DataField, DataRecord, Fund, MarketDataRecord, MarketDataRequest, RawDataRequest, Security};
use crate::query::{BuiltQuery, QueryBuilder, WarehouseLayout};
use crate::repo::{MarketDataRepository, RawDataRepository, RepoError, SqlExecutor, StoreError};

fn logged<T>(query: &BuiltQuery, result: Result<T, StoreError>) -> Result<T, RepoError> {
    result.map_err(|e| {
        error!(query = %query.text, params = ?query.params, error = %e, "warehouse query failed");
        RepoError::Query(e)
    })
}

/// Raw catalogs read from the warehouse.
pub struct SqlRawDataRepository {
    executor: Arc<dyn SqlExecutor>,
    layout: Arc<WarehouseLayout>,
    mapping: Arc<FundColumnMapping>,
}

impl SqlRawDataRepository {
    /// Repository over `executor`.
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        layout: Arc<WarehouseLayout>,
        mapping: Arc<FundColumnMapping>,
    ) -> Self {
        Self {
            executor,
            layout,
            mapping,
        }
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.layout)
    }

    /// Turns a request's catalog into a table name.
    ///
    /// Mapped catalogs come straight from the mapping; anything else must be
    /// listed by the delivery catalog.
    fn catalog_ident(&self, catalog: &str) -> Result<TrustedIdent, RepoError> {
        if let Some(entry) = self.mapping.lookup(catalog) {
            return Ok(entry.catalog.clone());
        }
        let listed = self.list_categories()?;
        if !listed.iter().any(|c| c == catalog) {
            return Err(RepoError::UnknownCatalog(catalog.to_string()));
        }
        TrustedIdent::new(catalog).map_err(|_| RepoError::UnknownCatalog(catalog.to_string()))
    }
}

impl RawDataRepository for SqlRawDataRepository {
    fn list_categories(&self) -> Result<Vec<String>, RepoError> {
        let q = self.builder().list_categories();
        logged(&q, self.executor.query_values(&q))
    }

    fn list_funds(&self, catalog: &str) -> Result<Vec<Fund>, RepoError> {
        let Some(entry) = self.mapping.lookup(catalog) else {
            return Ok(Vec::new());
        };
        let q = self.builder().list_funds(&entry.catalog, &entry.column);
        let names = logged(&q, self.executor.query_values(&q))?;
        Ok(names
            .into_iter()
            .map(|fund| Fund {
                fund,
                catalog: catalog.to_string(),
            })
            .collect())
    }

    fn fetch(&self, request: &RawDataRequest) -> Result<Vec<DataRecord>, RepoError> {
        let catalog = self.catalog_ident(&request.catalog)?;
        let q = self.builder().fetch_raw(&catalog, &self.mapping, request);
        let rows = logged(&q, self.executor.query_records(&q))?;
        debug!(catalog = %catalog, rows = rows.len(), "fetched raw data");
        Ok(rows)
    }
}

/// Market observations read from the warehouse.
pub struct SqlMarketDataRepository {
    executor: Arc<dyn SqlExecutor>,
    layout: Arc<WarehouseLayout>,
}

impl SqlMarketDataRepository {
    /// Repository over `executor`.
    pub fn new(executor: Arc<dyn SqlExecutor>, layout: Arc<WarehouseLayout>) -> Self {
        Self { executor, layout }
    }
}

fn market_record(row: DataRecord) -> Result<MarketDataRecord, StoreError> {
    let object = serde_json::Value::Object(row.into_iter().collect());
    Ok(serde_json::from_value(object)?)
}

impl MarketDataRepository for SqlMarketDataRepository {
    fn list_securities(&self) -> Result<Vec<Security>, RepoError> {
        let q = QueryBuilder::new(&self.layout).list_securities();
        let names = logged(&q, self.executor.query_values(&q))?;
        Ok(names.into_iter().map(|security| Security { security }).collect())
    }

    fn list_fields(&self, security: &str) -> Result<Vec<DataField>, RepoError> {
        let q = QueryBuilder::new(&self.layout).list_fields(security);
        let names = logged(&q, self.executor.query_values(&q))?;
        Ok(names
            .into_iter()
            .map(|field| DataField {
                field,
                security: security.to_string(),
            })
            .collect())
    }

    fn fetch(&self, request: &MarketDataRequest) -> Result<Vec<MarketDataRecord>, RepoError> {
        let q = QueryBuilder::new(&self.layout).fetch_market(request);
        let rows = logged(&q, self.executor.query_records(&q))?;
        let decoded = rows
            .into_iter()
            .map(market_record)
            .collect::<Result<Vec<_>, _>>();
        logged(&q, decoded)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::models::DateRange;
    use crate::query::SqlValue;

    /// Answers by the first matching fragment of the query text and records every query.
    #[derive(Default)]
    struct ScriptedExecutor {
        values: Vec<(&'static str, Vec<String>)>,
        records: Vec<DataRecord>,
        fail: bool,
        seen: Mutex<Vec<BuiltQuery>>,
    }

    impl SqlExecutor for ScriptedExecutor {
        fn query_values(&self, query: &BuiltQuery) -> Result<Vec<String>, StoreError> {
            self.seen.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(StoreError::Database(diesel::result::Error::NotFound));
            }
            Ok(self
                .values
                .iter()
                .find(|(frag, _)| query.text.contains(frag))
                .map(|(_, v)| v.clone())
                .unwrap_or_default())
        }

        fn query_records(&self, query: &BuiltQuery) -> Result<Vec<DataRecord>, StoreError> {
            self.seen.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(StoreError::Database(diesel::result::Error::NotFound));
            }
            Ok(self.records.clone())
        }
    }

    fn raw_repo(exec: Arc<ScriptedExecutor>) -> SqlRawDataRepository {
        SqlRawDataRepository::new(
            exec,
            Arc::new(WarehouseLayout::default()),
            Arc::new(FundColumnMapping::builtin()),
        )
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn unmapped_catalog_lists_no_funds_without_querying() {
        let exec = Arc::new(ScriptedExecutor::default());
        let repo = raw_repo(exec.clone());
        assert!(repo.list_funds("BALANCE_SHEET").unwrap().is_empty());
        assert!(exec.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn mapped_catalog_lists_funds_with_catalog_attached() {
        let exec = Arc::new(ScriptedExecutor {
            values: vec![("FUND_NAME", vec!["ALPHA".into(), "BETA".into()])],
            ..Default::default()
        });
        let funds = raw_repo(exec).list_funds("HAAS_FUND_PRICE").unwrap();
        assert_eq!(funds.len(), 2);
        assert_eq!(funds[1].fund, "BETA");
        assert_eq!(funds[1].catalog, "HAAS_FUND_PRICE");
    }

    #[test]
    fn introspected_catalog_is_fetched_without_fund_parameter() {
        let mut row = DataRecord::new();
        row.insert("ACCOUNT".into(), json!("1000"));
        let exec = Arc::new(ScriptedExecutor {
            values: vec![("DELIVERY_CATALOG", vec!["BALANCE_SHEET".into()])],
            records: vec![row],
            ..Default::default()
        });
        let repo = raw_repo(exec.clone());
        let rows = repo
            .fetch(&RawDataRequest {
                catalog: "BALANCE_SHEET".into(),
                fund: "STRAY".into(),
                dates: january(),
            })
            .unwrap();
        assert_eq!(rows.len(), 1);

        let seen = exec.seen.lock().unwrap();
        let fetch = seen.last().unwrap();
        assert!(fetch.text.contains(r#""dbo"."BALANCE_SHEET""#));
        assert_eq!(fetch.param("fund"), None);
    }

    #[test]
    fn catalog_outside_the_closed_set_is_rejected() {
        let exec = Arc::new(ScriptedExecutor {
            values: vec![("DELIVERY_CATALOG", vec!["BALANCE_SHEET".into()])],
            ..Default::default()
        });
        let err = raw_repo(exec.clone())
            .fetch(&RawDataRequest {
                catalog: "pg_catalog.pg_user".into(),
                fund: String::new(),
                dates: january(),
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::UnknownCatalog(_)));
        // only the introspection query ran
        assert_eq!(exec.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn execution_failure_becomes_query_error() {
        let exec = Arc::new(ScriptedExecutor {
            fail: true,
            ..Default::default()
        });
        let err = raw_repo(exec).list_categories().unwrap_err();
        assert!(matches!(err, RepoError::Query(StoreError::Database(_))));
    }

    #[test]
    fn market_rows_decode_into_records() {
        let mut row = DataRecord::new();
        row.insert("security".into(), json!("AAPL US Equity"));
        row.insert("field".into(), json!("PX_LAST"));
        row.insert("date".into(), json!("2024-01-02"));
        row.insert("value".into(), json!(185.64));
        let exec = Arc::new(ScriptedExecutor {
            records: vec![row],
            ..Default::default()
        });
        let repo = SqlMarketDataRepository::new(exec.clone(), Arc::new(WarehouseLayout::default()));
        let recs = repo
            .fetch(&MarketDataRequest {
                security: "AAPL US Equity".into(),
                field: "PX_LAST".into(),
                dates: january(),
            })
            .unwrap();
        assert_eq!(recs[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(recs[0].value, json!(185.64));

        let seen = exec.seen.lock().unwrap();
        assert_eq!(
            seen[0].param("security"),
            Some(&SqlValue::Text("AAPL US Equity".into()))
        );
    }

    #[test]
    fn malformed_market_row_is_a_query_error() {
        let mut row = DataRecord::new();
        row.insert("security".into(), json!("AAPL US Equity"));
        let exec = Arc::new(ScriptedExecutor {
            records: vec![row],
            ..Default::default()
        });
        let repo = SqlMarketDataRepository::new(exec, Arc::new(WarehouseLayout::default()));
        let err = repo
            .fetch(&MarketDataRequest {
                security: "AAPL US Equity".into(),
                field: "PX_LAST".into(),
                dates: january(),
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::Query(StoreError::Decode(_))));
    }
}
