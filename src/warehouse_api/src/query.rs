//! Parameterized query construction for the live (PostgreSQL) repositories.
//!
//! Two kinds of input reach a query and they never mix:
//! - identifiers (schema, tables, columns) are [`TrustedIdent`]s and are spliced
//!   into the text, double-quoted;
//! - values from the request (fund, security, field, dates) become
//!   [`SqlParam`]s bound to `$1..$n` placeholders.
//!
//! Every query projects a single text column. Listing queries alias it `value`;
//! record queries alias it `record` and carry one JSON object per row, built
//! with `row_to_json` so the table's own column order survives into the
//! response.
//!
//! Raw fetches branch on the fund-column mapping: mapped catalogs get an
//! equality predicate on their fund column, unmapped catalogs get no fund
//! predicate and no `fund` parameter at all. Both are scoped to the requested
//! dates through the load metadata table (`load timestamp` cast to date,
//! inclusive bounds).

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::fund_mapping::FundColumnMapping;
use crate::ident::TrustedIdent;
use crate::models::{MarketDataRequest, RawDataRequest};

/// Alias of the text column holding a listed name.
pub const VALUE_COLUMN: &str = "value";
/// Alias of the text column holding a JSON-encoded row.
pub const RECORD_COLUMN: &str = "record";

/// A bound value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// `text`
    Text(String),
    /// `date`
    Date(NaiveDate),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Date(d) => write!(f, "{d}"),
        }
    }
}

/// A named bound value; the name is for logs and tests, binding is positional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlParam {
    /// Logical parameter name.
    pub name: &'static str,
    /// Bound value.
    pub value: SqlValue,
}

impl SqlParam {
    /// Creates a parameter.
    pub fn new(name: &'static str, value: SqlValue) -> Self {
        Self { name, value }
    }
}

/// Query text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    /// SQL text with `$n` placeholders.
    pub text: String,
    /// Parameters; `params[i]` binds `$(i + 1)`.
    pub params: Vec<SqlParam>,
}

impl BuiltQuery {
    fn new(text: String, params: Vec<SqlParam>) -> Self {
        Self { text, params }
    }

    /// Looks a parameter up by name.
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

impl fmt::Display for BuiltQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.text)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "${}={}:{}", i + 1, p.name, p.value)?;
        }
        f.write_str("]")
    }
}

/// Delivery catalog: which file categories (catalogs) are currently valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCatalogTable {
    /// Table name.
    pub table: TrustedIdent,
    /// Column holding the catalog name.
    pub category: TrustedIdent,
    /// Start of validity.
    pub valid_from: TrustedIdent,
    /// End of validity.
    pub valid_to: TrustedIdent,
}

/// Load metadata joined to catalog tables for date scoping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMetadataTable {
    /// Table name.
    pub table: TrustedIdent,
    /// Join key present in both the load table and every catalog table.
    pub key: TrustedIdent,
    /// Load timestamp compared against the requested dates.
    pub timestamp: TrustedIdent,
}

/// Market-data table and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketTable {
    /// Table name.
    pub table: TrustedIdent,
    /// Security column.
    pub security: TrustedIdent,
    /// Field column.
    pub field: TrustedIdent,
    /// Observation date column.
    pub date: TrustedIdent,
    /// Value column.
    pub value: TrustedIdent,
}

/// Where things live in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseLayout {
    /// Schema holding every table below and all catalogs.
    pub schema: TrustedIdent,
    /// Delivery catalog table.
    pub delivery_catalog: DeliveryCatalogTable,
    /// Load metadata table.
    pub load_metadata: LoadMetadataTable,
    /// Market-data table.
    pub market: MarketTable,
}

impl Default for WarehouseLayout {
    fn default() -> Self {
        let id = TrustedIdent::from_static;
        Self {
            schema: id("dbo"),
            delivery_catalog: DeliveryCatalogTable {
                table: id("DELIVERY_CATALOG"),
                category: id("FILE_CATEGORY"),
                valid_from: id("VALID_FROM"),
                valid_to: id("VALID_TO"),
            },
            load_metadata: LoadMetadataTable {
                table: id("DELIVERY_LOAD"),
                key: id("LOAD_ID"),
                timestamp: id("LOAD_TIMESTAMP"),
            },
            market: MarketTable {
                table: id("BLOOMBERG_ODD_MONTHLY"),
                security: id("security"),
                field: id("field"),
                date: id("date"),
                value: id("value"),
            },
        }
    }
}

/// Builds the queries of both live repositories.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    layout: &'a WarehouseLayout,
}

impl<'a> QueryBuilder<'a> {
    /// Builder over `layout`.
    pub fn new(layout: &'a WarehouseLayout) -> Self {
        Self { layout }
    }

    fn table(&self, table: &TrustedIdent) -> String {
        format!("{}.{}", self.layout.schema.quoted(), table.quoted())
    }

    /// Catalogs valid right now, sorted.
    pub fn list_categories(&self) -> BuiltQuery {
        let dc = &self.layout.delivery_catalog;
        let text = format!(
            "SELECT DISTINCT d.{cat}::text AS {VALUE_COLUMN} \
             FROM {table} d \
             WHERE now() > d.{from} AND now() < d.{to} \
             ORDER BY 1",
            cat = dc.category.quoted(),
            table = self.table(&dc.table),
            from = dc.valid_from.quoted(),
            to = dc.valid_to.quoted(),
        );
        BuiltQuery::new(text, Vec::new())
    }

    /// Distinct non-null values of `fund_column` in `catalog`, sorted.
    pub fn list_funds(&self, catalog: &TrustedIdent, fund_column: &TrustedIdent) -> BuiltQuery {
        let col = fund_column.quoted();
        let text = format!(
            "SELECT DISTINCT c.{col}::text AS {VALUE_COLUMN} \
             FROM {table} c \
             WHERE c.{col} IS NOT NULL \
             ORDER BY 1",
            table = self.table(catalog),
        );
        BuiltQuery::new(text, Vec::new())
    }

    /// Rows of `catalog` loaded within the request's dates, fund-scoped when mapped.
    pub fn fetch_raw(
        &self,
        catalog: &TrustedIdent,
        mapping: &FundColumnMapping,
        request: &RawDataRequest,
    ) -> BuiltQuery {
        let load = &self.layout.load_metadata;
        let fund_column = mapping.lookup(catalog.as_str()).map(|f| &f.column);

        let mut params = request.to_query_params();
        if fund_column.is_none() {
            params.retain(|p| p.name != "fund");
        }

        let mut predicates = Vec::with_capacity(2);
        let mut next = 1;
        if let Some(col) = fund_column {
            predicates.push(format!("c.{} = ${next}", col.quoted()));
            next += 1;
        }
        predicates.push(format!(
            "l.{ts}::date BETWEEN ${a} AND ${b}",
            ts = load.timestamp.quoted(),
            a = next,
            b = next + 1,
        ));

        let text = format!(
            "SELECT row_to_json(c)::text AS {RECORD_COLUMN} \
             FROM {table} c \
             JOIN {load_table} l ON l.{key} = c.{key} \
             WHERE {predicates} \
             ORDER BY l.{ts}",
            table = self.table(catalog),
            load_table = self.table(&load.table),
            key = load.key.quoted(),
            predicates = predicates.join(" AND "),
            ts = load.timestamp.quoted(),
        );
        BuiltQuery::new(text, params)
    }

    /// Distinct securities, sorted.
    pub fn list_securities(&self) -> BuiltQuery {
        let m = &self.layout.market;
        let text = format!(
            "SELECT DISTINCT b.{sec}::text AS {VALUE_COLUMN} FROM {table} b ORDER BY 1",
            sec = m.security.quoted(),
            table = self.table(&m.table),
        );
        BuiltQuery::new(text, Vec::new())
    }

    /// Distinct fields published for `security`, sorted.
    pub fn list_fields(&self, security: &str) -> BuiltQuery {
        let m = &self.layout.market;
        let text = format!(
            "SELECT DISTINCT b.{field}::text AS {VALUE_COLUMN} \
             FROM {table} b \
             WHERE b.{sec} = $1 \
             ORDER BY 1",
            field = m.field.quoted(),
            table = self.table(&m.table),
            sec = m.security.quoted(),
        );
        BuiltQuery::new(
            text,
            vec![SqlParam::new("security", SqlValue::Text(security.to_string()))],
        )
    }

    /// Observations of one security field within the request's dates, by date.
    pub fn fetch_market(&self, request: &MarketDataRequest) -> BuiltQuery {
        let m = &self.layout.market;
        let text = format!(
            "SELECT json_build_object(\
             'security', b.{sec}, 'field', b.{field}, 'date', b.{date}::date, 'value', b.{value}\
             )::text AS {RECORD_COLUMN} \
             FROM {table} b \
             WHERE b.{sec} = $1 AND b.{field} = $2 AND b.{date}::date BETWEEN $3 AND $4 \
             ORDER BY b.{date}",
            sec = m.security.quoted(),
            field = m.field.quoted(),
            date = m.date.quoted(),
            value = m.value.quoted(),
            table = self.table(&m.table),
        );
        BuiltQuery::new(text, request.to_query_params())
    }
}
