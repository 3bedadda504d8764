//! Catalog → fund-column mapping.
//!
//! A catalog (warehouse table) listed here can be scoped to one fund through
//! the named column. Catalogs missing from the table do not support fund
//! filtering at all: their fund dropdown is empty and downloads never filter
//! by fund, even when the client sends one.
//!
//! The mapping is built once at startup from [`BUILTIN_FUND_COLUMNS`],
//! optionally overlaid with a `[fund_columns]` TOML table, and is read-only
//! afterwards (shared behind an `Arc`).
//!
//! Entrypoints:
//! - Built-in table only: [`FundColumnMapping::builtin`]
//! - Built-in table plus overrides: [`FundColumnMapping::with_overrides`]

use anyhow::{Context, bail};
use indexmap::IndexMap;

use crate::ident::TrustedIdent;

/// Fund columns of the warehouse tables known at build time.
pub const BUILTIN_FUND_COLUMNS: &[(&str, &str)] = &[
    ("CITCO_ALLOC", "fs_desc"),
    ("CITCO_CAPACT", "CODE"),
    ("CITCO_PCAM_AEXBONDACCR", "FUND"),
    ("CITCO_PCAM_DEBT_COUPON_PAYMENTS_SUMMARY", "FUND"),
    ("CITCO_PCAM_DETAIL_TB", "FUND"),
    ("CITCO_PCAM_DIV", "FUND"),
    ("CITCO_PCAM_FX_CURVAL", "FUND"),
    ("CITCO_PCAM_GL", "FUND"),
    ("CITCO_PCAM_MONTHLYTB", "FUND"),
    ("CITCO_PCAM_PORTFHOLD", "FUND"),
    ("CITCO_PCAM_REALIZED_UNREALIZED_0", "FUND_ABBREV"),
    ("CITCO_PCAM_UNSETTLED", "FUND"),
    ("CITCO_PCAM_YETB", "FUND"),
    ("CITCO_NAV", "FUND_ABBREV"),
    ("CITCO_CAR", "FS_DESC"),
    ("CITCO_SPOS_PCAM", "SUBFUND"),
    ("CITCO_SECUR", "CLIENT_NAME"),
    ("HAAS_DI_SUMMARY", "FUND_NAME"),
    ("HAAS_DIRECT_TRANSACTIONS", "FUND_NAME"),
    ("HAAS_FI_SUMMARY", "FUND_NAME"),
    ("HAAS_FI_TRANSACTIONS", "FUND_NAME"),
    ("HAAS_FUND_PRICE", "FUND_NAME"),
    ("HAAS_GL_TRANSACTIONS", "FUND_NAME"),
    ("HAAS_INVESTOR_DATA", "FUND_NAME"),
    ("HAAS_INVESTOR_OPERATIONS", "FUND_NAME"),
    ("HAAS_TRIAL_BALANCE", "FUND_NAME"),
];

/// Mapping entry: the catalog as a trusted table name plus its fund column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundColumn {
    /// Catalog (table) name.
    pub catalog: TrustedIdent,
    /// Column holding the fund identifier.
    pub column: TrustedIdent,
}

/// Read-only catalog → fund-column table.
#[derive(Debug, Clone, Default)]
pub struct FundColumnMapping {
    entries: IndexMap<String, FundColumn>,
}

impl FundColumnMapping {
    /// The built-in table.
    pub fn builtin() -> Self {
        let entries = BUILTIN_FUND_COLUMNS
            .iter()
            .map(|&(catalog, column)| {
                let entry = FundColumn {
                    catalog: TrustedIdent::from_static(catalog),
                    column: TrustedIdent::from_static(column),
                };
                (catalog.to_string(), entry)
            })
            .collect();
        Self { entries }
    }

    /// Built-in table overlaid with `overrides` (catalog → column).
    ///
    /// Keys and values are trimmed. An override replaces a built-in entry with
    /// the same catalog name; new catalogs are appended in input order.
    ///
    /// Errors:
    /// - empty catalog or column after trimming
    /// - names that are not valid identifiers
    /// - two override keys that collide after trimming
    pub fn with_overrides(overrides: &IndexMap<String, String>) -> anyhow::Result<Self> {
        let mut mapping = Self::builtin();
        let mut seen = std::collections::HashSet::new();

        for (raw_catalog, raw_column) in overrides {
            let catalog = raw_catalog.trim();
            let column = raw_column.trim();
            if catalog.is_empty() || column.is_empty() {
                bail!("fund_columns entries cannot be empty after trimming");
            }
            if !seen.insert(catalog.to_string()) {
                bail!("duplicate fund_columns catalog after trimming: {catalog}");
            }
            let entry = FundColumn {
                catalog: TrustedIdent::new(catalog)
                    .with_context(|| format!("fund_columns catalog {catalog:?}"))?,
                column: TrustedIdent::new(column)
                    .with_context(|| format!("fund_columns column for {catalog}"))?,
            };
            mapping.entries.insert(catalog.to_string(), entry);
        }
        Ok(mapping)
    }

    /// Fund-column entry for `catalog`, if the catalog supports fund filtering.
    pub fn lookup(&self, catalog: &str) -> Option<&FundColumn> {
        self.entries.get(catalog)
    }

    /// Whether `catalog` supports fund filtering.
    pub fn has_fund_filtering(&self, catalog: &str) -> bool {
        self.entries.contains_key(catalog)
    }

    /// Mapped catalog names, in table order.
    pub fn catalogs(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of mapped catalogs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no catalog supports fund filtering.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
