//! Warehouse data API: spreadsheet-facing access to raw catalogs and market data.
//!
//! The data-access core picks a live or synthetic backend per domain at
//! startup ([`repo::resolve`]), builds catalog-specific parameterized queries
//! ([`query`]) and cuts large results into deterministic batches ([`paginate`]).

#![deny(missing_docs)]

pub mod config;
pub mod db;
pub mod dto;
pub mod environment;
pub mod fund_mapping;
pub mod http;
pub mod ident;
pub mod models;
pub mod paginate;
pub mod query;
pub mod repo;
pub mod service;
pub mod upload;
