//! One-way forwarding of spreadsheet uploads to the ingestion endpoint.
//!
//! The payload is validated and wrapped in an envelope by [`build_envelope`],
//! then POSTed by [`UploadForwarder`]. Nothing is retried; the caller gets a
//! classified [`ForwardError`] and decides what to tell the client.

use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Certificate, Client, Identity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{Backtrace, IntoError, ResultExt, Snafu};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::UploadConfig;

/// `source` value of every envelope.
pub const ENVELOPE_SOURCE: &str = "excel_addin";
/// Longest upstream body excerpt kept in an error.
pub const MAX_UPSTREAM_BODY_CHARS: usize = 500;

/// A kind of data the client may upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadType {
    /// Stable identifier, sent back as `dataType`.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// Upload types offered to the client.
pub const UPLOAD_TYPES: &[UploadType] = &[
    UploadType {
        id: "windmill_statistics",
        name: "Windmill Statistics",
        description: "Statistical data for windmill performance analysis",
    },
    UploadType {
        id: "financial_outperformance",
        name: "Financial Outperformance",
        description: "Financial performance comparison data",
    },
    UploadType {
        id: "excellence_accounting",
        name: "Excellence Accounting",
        description: "Accounting excellence metrics and data",
    },
];

/// Body of `POST /api/data-upload/upload`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    /// Upload type id.
    #[serde(alias = "data_type")]
    pub data_type: Option<String>,
    /// Ask ingestion to skip its duplicate check.
    #[serde(default, alias = "skip_duplicate_check")]
    pub skip_duplicate_check: bool,
    /// Delivery date as entered by the user; passed through untouched.
    #[serde(alias = "delivery_date")]
    pub delivery_date: Option<String>,
    /// Rows to upload; must be a non-empty array of objects.
    pub data: Option<Value>,
}

/// Upload payload rejected before forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadValidationError {
    /// `dataType` absent or blank.
    #[error("Data type is required")]
    MissingDataType,
    /// `data` absent, not an array, or empty.
    #[error("Data array is required and must be non-empty")]
    EmptyData,
    /// An element of `data` is not an object.
    #[error("Invalid record format at index {0}")]
    InvalidRecord(usize),
}

/// Per-envelope settings echoed to ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadConfiguration {
    /// See [`UploadPayload::skip_duplicate_check`].
    pub skip_duplicate_check: bool,
    /// See [`UploadPayload::delivery_date`].
    pub delivery_date: Option<String>,
}

/// What is sent to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadEnvelope {
    /// Always [`ENVELOPE_SOURCE`].
    pub source: &'static str,
    /// UTC time the envelope was built, RFC 3339.
    pub upload_timestamp: String,
    /// Upload type id.
    pub data_type: String,
    /// Settings.
    pub configuration: UploadConfiguration,
    /// Records, each stamped with `_upload_metadata`.
    pub records: Vec<Map<String, Value>>,
    /// `records.len()`
    pub record_count: usize,
}

/// Validates `payload` and stamps every record with `_upload_metadata`.
pub fn build_envelope(payload: UploadPayload, now: DateTime<Utc>) -> Result<UploadEnvelope, UploadValidationError> {
    let data_type = payload
        .data_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(UploadValidationError::MissingDataType)?;

    let rows = match payload.data {
        Some(Value::Array(rows)) if !rows.is_empty() => rows,
        _ => return Err(UploadValidationError::EmptyData),
    };

    let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let Value::Object(mut record) = row else {
                return Err(UploadValidationError::InvalidRecord(i));
            };
            record.insert(
                "_upload_metadata".into(),
                serde_json::json!({
                    "upload_timestamp": timestamp,
                    "data_type": data_type,
                    "skip_duplicate_check": payload.skip_duplicate_check,
                    "delivery_date": payload.delivery_date,
                    "record_index": i,
                }),
            );
            Ok(record)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(UploadEnvelope {
        source: ENVELOPE_SOURCE,
        upload_timestamp: timestamp,
        data_type,
        configuration: UploadConfiguration {
            skip_duplicate_check: payload.skip_duplicate_check,
            delivery_date: payload.delivery_date,
        },
        record_count: records.len(),
        records,
    })
}

/// The forwarder could not be built from its configuration.
#[derive(Debug, Snafu)]
pub enum ForwarderInitError {
    /// A PEM file could not be read.
    #[snafu(display("Cannot read {}: {source}", path.display()))]
    ReadPem {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// A PEM file did not hold a usable certificate or identity.
    #[snafu(display("Invalid PEM in {}: {source}", path.display()))]
    InvalidPem {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: reqwest::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// The HTTP client could not be built.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        /// Underlying error.
        source: reqwest::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },
}

/// Forwarding to the ingestion endpoint failed.
#[derive(Debug, Snafu)]
pub enum ForwardError {
    /// No endpoint configured.
    #[snafu(display("Upload endpoint is not configured"))]
    NotConfigured {
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// TLS handshake or certificate verification failed.
    #[snafu(display("SSL certificate verification failed: {source}"))]
    Tls {
        /// Underlying error.
        source: reqwest::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// No response within the timeout.
    #[snafu(display("Upload timeout: {source}"))]
    Timeout {
        /// Underlying error.
        source: reqwest::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// DNS or TCP connection failure.
    #[snafu(display("Unable to connect: {source}"))]
    Connect {
        /// Underlying error.
        source: reqwest::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// The endpoint answered with a non-success status.
    #[snafu(display("Upstream processing failed with status {status}"))]
    Upstream {
        /// HTTP status returned.
        status: u16,
        /// First characters of the response body.
        body: String,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// Any other request failure.
    #[snafu(display("Request failed: {source}"))]
    Request {
        /// Underlying error.
        source: reqwest::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },
}

/// Only inner causes are inspected; the top-level message embeds the URL.
fn mentions_tls(err: &reqwest::Error) -> bool {
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        current = e.source();
    }
    false
}

/// Sorts a transport error into the variant the client is told about.
pub fn classify(err: reqwest::Error) -> ForwardError {
    if mentions_tls(&err) {
        TlsSnafu.into_error(err)
    } else if err.is_timeout() {
        TimeoutSnafu.into_error(err)
    } else if err.is_connect() {
        ConnectSnafu.into_error(err)
    } else {
        RequestSnafu.into_error(err)
    }
}

/// Successful forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamAck {
    /// Status returned by the endpoint.
    pub status: u16,
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ForwarderInitError> {
    std::fs::read(path).context(ReadPemSnafu { path })
}

/// Posts envelopes to the ingestion endpoint.
#[derive(Debug, Clone)]
pub struct UploadForwarder {
    client: Client,
    endpoint: Option<String>,
    forwarded_from: String,
}

impl UploadForwarder {
    /// Builds the HTTP client: timeout, extra CA, client identity, verification.
    pub fn from_config(cfg: &UploadConfig) -> Result<Self, ForwarderInitError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .danger_accept_invalid_certs(!cfg.verify_tls);

        if let Some(path) = &cfg.ca_bundle {
            let cert = Certificate::from_pem(&read_pem(path)?).context(InvalidPemSnafu { path })?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(path) = &cfg.client_identity {
            let identity = Identity::from_pem(&read_pem(path)?).context(InvalidPemSnafu { path })?;
            builder = builder.identity(identity);
        }
        debug!(
            verify = cfg.verify_tls,
            ca_bundle = cfg.ca_bundle.is_some(),
            client_identity = cfg.client_identity.is_some(),
            "upload TLS configuration"
        );

        Ok(Self {
            client: builder.build().context(ClientBuildSnafu)?,
            endpoint: cfg.endpoint.clone(),
            forwarded_from: cfg.forwarded_from.clone(),
        })
    }

    /// Whether an endpoint is configured.
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Posts `envelope` once.
    pub async fn forward(&self, envelope: &UploadEnvelope) -> Result<UpstreamAck, ForwardError> {
        let Some(endpoint) = &self.endpoint else {
            return NotConfiguredSnafu.fail();
        };
        info!(
            data_type = %envelope.data_type,
            records = envelope.record_count,
            endpoint = %endpoint,
            "forwarding upload"
        );

        let response = self
            .client
            .post(endpoint)
            .header("X-Forwarded-From", &self.forwarded_from)
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                let classified = classify(e);
                error!(error = %classified, "upload forwarding failed");
                classified
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_UPSTREAM_BODY_CHARS).collect();
            error!(status = status.as_u16(), body = %body, "ingestion endpoint rejected upload");
            return UpstreamSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        info!(records = envelope.record_count, status = status.as_u16(), "upload forwarded");
        Ok(UpstreamAck {
            status: status.as_u16(),
        })
    }
}
