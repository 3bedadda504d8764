//! Service configuration: TOML file plus environment overrides.
//!
//! Every table is optional; an empty file is a valid configuration that runs
//! against the built-in defaults (and therefore on synthetic data, since no
//! database URL is known).
//!
//! ```toml
//! [database]
//! schema = "dbo"
//! pool_size = 8
//! connect_timeout_secs = 5
//!
//! [database.urls]
//! staging = "postgres://reader@warehouse-stage/warehouse"
//!
//! [database.load_metadata]
//! table = "DELIVERY_LOAD"
//!
//! [environment]
//! production = ["vs84", "prod"]
//!
//! [fund_columns]
//! ACME_HOLDINGS = "PORTFOLIO"
//!
//! [upload]
//! endpoint = "https://ingest.internal/api/upload"
//! ```
//!
//! Overrides applied by [`AppConfig::apply_env`]:
//! - `DATABASE_URL` replaces the URL of whatever environment is resolved
//! - `UPLOAD_ENDPOINT` replaces `upload.endpoint`
//!
//! Entrypoints:
//! - Parse from a TOML string: [`load_config_str`]
//! - Parse from a file path: [`load_config_path`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use shared_utils::env::get_env_var_opt;
use thiserror::Error;

use crate::db::PoolSettings;
use crate::environment::{EnvironmentTag, HostRules};
use crate::fund_mapping::FundColumnMapping;
use crate::ident::{IdentError, TrustedIdent};
use crate::query::{DeliveryCatalogTable, LoadMetadataTable, MarketTable, WarehouseLayout};

/// Variable overriding the database URL.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Variable overriding the upload endpoint.
pub const UPLOAD_ENDPOINT_VAR: &str = "UPLOAD_ENDPOINT";

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`AppConfig`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A table or column name is not a valid identifier.
    #[error("invalid identifier for {key}: {source}")]
    Identifier {
        /// Config key holding the name.
        key: &'static str,
        /// Validation failure.
        #[source]
        source: IdentError,
    },
    /// The `[fund_columns]` table is invalid.
    #[error("invalid fund_columns: {0:#}")]
    FundColumns(anyhow::Error),
}

fn secret_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| SecretString::new(s.into())))
}

/// Complete service configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Warehouse connection and layout.
    pub database: DatabaseConfig,
    /// Hostname fragments for environment detection.
    pub environment: HostRules,
    /// Fund-column overrides (catalog → column).
    pub fund_columns: IndexMap<String, String>,
    /// Downstream ingestion endpoint.
    pub upload: UploadConfig,
}

/// `[database]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Schema holding every table.
    pub schema: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Seconds to wait for a connection, at startup and per checkout.
    pub connect_timeout_secs: u64,
    /// Connection URL per environment.
    pub urls: DatabaseUrls,
    /// Set from `DATABASE_URL`; wins over `urls`.
    #[serde(skip)]
    pub url_override: Option<SecretString>,
    /// `[database.delivery_catalog]`
    pub delivery_catalog: DeliveryCatalogConfig,
    /// `[database.load_metadata]`
    pub load_metadata: LoadMetadataConfig,
    /// `[database.market]`
    pub market: MarketConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            schema: "dbo".into(),
            pool_size: 8,
            connect_timeout_secs: 5,
            urls: DatabaseUrls::default(),
            url_override: None,
            delivery_catalog: DeliveryCatalogConfig::default(),
            load_metadata: LoadMetadataConfig::default(),
            market: MarketConfig::default(),
        }
    }
}

/// `[database.urls]`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseUrls {
    /// Development target, usually absent.
    #[serde(deserialize_with = "secret_opt")]
    pub development: Option<SecretString>,
    /// Staging target.
    #[serde(deserialize_with = "secret_opt")]
    pub staging: Option<SecretString>,
    /// Production target.
    #[serde(deserialize_with = "secret_opt")]
    pub production: Option<SecretString>,
}

/// `[database.delivery_catalog]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryCatalogConfig {
    /// Table name.
    pub table: String,
    /// Catalog-name column.
    pub category_column: String,
    /// Validity start column.
    pub valid_from_column: String,
    /// Validity end column.
    pub valid_to_column: String,
}

impl Default for DeliveryCatalogConfig {
    fn default() -> Self {
        Self {
            table: "DELIVERY_CATALOG".into(),
            category_column: "FILE_CATEGORY".into(),
            valid_from_column: "VALID_FROM".into(),
            valid_to_column: "VALID_TO".into(),
        }
    }
}

/// `[database.load_metadata]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadMetadataConfig {
    /// Table name.
    pub table: String,
    /// Join key shared with catalog tables.
    pub key_column: String,
    /// Load timestamp column.
    pub timestamp_column: String,
}

impl Default for LoadMetadataConfig {
    fn default() -> Self {
        Self {
            table: "DELIVERY_LOAD".into(),
            key_column: "LOAD_ID".into(),
            timestamp_column: "LOAD_TIMESTAMP".into(),
        }
    }
}

/// `[database.market]`
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    /// Table name.
    pub table: String,
    /// Security column.
    pub security_column: String,
    /// Field column.
    pub field_column: String,
    /// Date column.
    pub date_column: String,
    /// Value column.
    pub value_column: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            table: "BLOOMBERG_ODD_MONTHLY".into(),
            security_column: "security".into(),
            field_column: "field".into(),
            date_column: "date".into(),
            value_column: "value".into(),
        }
    }
}

/// `[upload]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Ingestion endpoint; uploads are rejected when unset.
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Value of the `X-Forwarded-From` header.
    pub forwarded_from: String,
    /// Extra PEM CA bundle to trust.
    pub ca_bundle: Option<PathBuf>,
    /// PEM file with client certificate and private key.
    pub client_identity: Option<PathBuf>,
    /// Verify the endpoint's certificate.
    pub verify_tls: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
            forwarded_from: "warehouse-api".into(),
            ca_bundle: None,
            client_identity: None,
            verify_tls: true,
        }
    }
}

fn ident(key: &'static str, raw: &str) -> Result<TrustedIdent, ConfigError> {
    TrustedIdent::new(raw.trim()).map_err(|source| ConfigError::Identifier { key, source })
}

impl DatabaseConfig {
    /// Connection URL for `environment`; `DATABASE_URL` wins when set.
    pub fn target(&self, environment: EnvironmentTag) -> Option<&SecretString> {
        self.url_override.as_ref().or(match environment {
            EnvironmentTag::Development => self.urls.development.as_ref(),
            EnvironmentTag::Staging => self.urls.staging.as_ref(),
            EnvironmentTag::Production => self.urls.production.as_ref(),
        })
    }

    /// Moves the target for `environment` out of the config.
    pub fn take_target(&mut self, environment: EnvironmentTag) -> Option<SecretString> {
        self.url_override.take().or_else(|| match environment {
            EnvironmentTag::Development => self.urls.development.take(),
            EnvironmentTag::Staging => self.urls.staging.take(),
            EnvironmentTag::Production => self.urls.production.take(),
        })
    }

    /// Pool sizing (a zero pool size is raised to one).
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_size: self.pool_size.max(1),
            connection_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
        }
    }

    /// Validated table layout.
    pub fn layout(&self) -> Result<WarehouseLayout, ConfigError> {
        let dc = &self.delivery_catalog;
        let lm = &self.load_metadata;
        let m = &self.market;
        Ok(WarehouseLayout {
            schema: ident("database.schema", &self.schema)?,
            delivery_catalog: DeliveryCatalogTable {
                table: ident("database.delivery_catalog.table", &dc.table)?,
                category: ident("database.delivery_catalog.category_column", &dc.category_column)?,
                valid_from: ident("database.delivery_catalog.valid_from_column", &dc.valid_from_column)?,
                valid_to: ident("database.delivery_catalog.valid_to_column", &dc.valid_to_column)?,
            },
            load_metadata: LoadMetadataTable {
                table: ident("database.load_metadata.table", &lm.table)?,
                key: ident("database.load_metadata.key_column", &lm.key_column)?,
                timestamp: ident("database.load_metadata.timestamp_column", &lm.timestamp_column)?,
            },
            market: MarketTable {
                table: ident("database.market.table", &m.table)?,
                security: ident("database.market.security_column", &m.security_column)?,
                field: ident("database.market.field_column", &m.field_column)?,
                date: ident("database.market.date_column", &m.date_column)?,
                value: ident("database.market.value_column", &m.value_column)?,
            },
        })
    }
}

impl AppConfig {
    /// Applies `DATABASE_URL` and `UPLOAD_ENDPOINT` when set and non-blank.
    pub fn apply_env(&mut self) {
        if let Some(url) = get_env_var_opt(DATABASE_URL_VAR) {
            self.database.url_override = Some(SecretString::new(url.into()));
        }
        if let Some(endpoint) = get_env_var_opt(UPLOAD_ENDPOINT_VAR) {
            self.upload.endpoint = Some(endpoint);
        }
    }

    /// Built-in fund mapping overlaid with `[fund_columns]`.
    pub fn fund_mapping(&self) -> Result<FundColumnMapping, ConfigError> {
        FundColumnMapping::with_overrides(&self.fund_columns).map_err(ConfigError::FundColumns)
    }
}

/// Parses a configuration from TOML text. Environment overrides are not applied.
pub fn load_config_str(s: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(s)?)
}

/// Reads and parses a configuration file. Environment overrides are not applied.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&text)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = load_config_str("").unwrap();
        assert_eq!(cfg.database.schema, "dbo");
        assert_eq!(cfg.upload.timeout_secs, 30);
        assert!(cfg.upload.verify_tls);
        assert!(cfg.database.target(EnvironmentTag::Production).is_none());
        assert_eq!(cfg.database.layout().unwrap(), WarehouseLayout::default());
    }

    #[test]
    fn urls_are_picked_per_environment() {
        let cfg = load_config_str(
            r#"
            [database.urls]
            staging = "postgres://stage/wh"
            production = "  "
            "#,
        )
        .unwrap();
        let staging = cfg.database.target(EnvironmentTag::Staging).unwrap();
        assert_eq!(staging.expose_secret(), "postgres://stage/wh");
        // blank means unset
        assert!(cfg.database.target(EnvironmentTag::Production).is_none());
    }

    #[test]
    fn override_wins_over_every_environment() {
        let mut cfg = load_config_str("[database.urls]\nstaging = \"postgres://stage/wh\"").unwrap();
        cfg.database.url_override = Some(SecretString::new("postgres://local/wh".into()));
        for env in [EnvironmentTag::Development, EnvironmentTag::Staging] {
            assert_eq!(cfg.database.target(env).unwrap().expose_secret(), "postgres://local/wh");
        }
    }

    #[test]
    fn bad_identifiers_are_rejected_with_their_key() {
        let cfg = load_config_str("[database.market]\ntable = \"BLOOMBERG; DROP\"").unwrap();
        let err = cfg.database.layout().unwrap_err();
        assert!(err.to_string().contains("database.market.table"), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            load_config_str("[database]\nshema = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn fund_column_overrides_feed_the_mapping() {
        let cfg = load_config_str("[fund_columns]\nACME_HOLDINGS = \"PORTFOLIO\"").unwrap();
        let m = cfg.fund_mapping().unwrap();
        assert!(m.has_fund_filtering("ACME_HOLDINGS"));
        assert!(m.has_fund_filtering("CITCO_NAV"));
    }

    #[test]
    fn pool_settings_never_zero() {
        let cfg = load_config_str("[database]\npool_size = 0\nconnect_timeout_secs = 0").unwrap();
        let p = cfg.database.pool_settings();
        assert_eq!(p.max_size, 1);
        assert_eq!(p.connection_timeout, Duration::from_secs(1));
    }
}
