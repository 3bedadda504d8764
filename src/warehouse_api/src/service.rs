//! Application services: validation, repository calls, batching.
//!
//! Services are what the HTTP handlers talk to. Each owns the repository its
//! domain was resolved to at startup and reports which backend that is.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::dto::{self, BatchSpec, MarketDataPayload, RawDataPayload, ValidationError};
use crate::fund_mapping::FundColumnMapping;
use crate::models::{DataRecord, MarketDataRequest, RawDataRequest};
use crate::paginate::{BatchedResponse, paginate};
use crate::repo::{Backend, MarketDataRepository, RawDataRepository, RepoError, Resolved};

/// Service-level failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was rejected before any repository call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The repository failed.
    #[error(transparent)]
    Repository(#[from] RepoError),
}

/// Funds of a catalog plus whether the catalog can be filtered by fund at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundListing {
    /// Fund names.
    pub funds: Vec<String>,
    /// `false` for catalogs without a fund column.
    pub fund_filtering_available: bool,
}

/// Records of a download, whole or one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResult {
    /// Every matching record.
    Full(Vec<DataRecord>),
    /// One batch of the matching records.
    Batch(BatchedResponse<DataRecord>),
}

fn logged<T>(op: &'static str, result: Result<T, RepoError>) -> Result<T, ServiceError> {
    result.map_err(|e| {
        error!(op, error = %e, "repository call failed");
        ServiceError::Repository(e)
    })
}

/// Raw catalogs, funds and downloads.
pub struct RawDataService {
    repository: Arc<dyn RawDataRepository>,
    mapping: Arc<FundColumnMapping>,
    backend: Backend,
}

impl RawDataService {
    /// Service over the resolved raw-data repository.
    pub fn new(resolved: Resolved<dyn RawDataRepository>, mapping: Arc<FundColumnMapping>) -> Self {
        Self {
            repository: resolved.repository,
            mapping,
            backend: resolved.backend,
        }
    }

    /// Backend serving this domain.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Catalog names.
    pub fn list_categories(&self) -> Result<Vec<String>, ServiceError> {
        logged("list_categories", self.repository.list_categories())
    }

    /// Funds of `catalog`. Unmapped catalogs answer without a repository call.
    pub fn list_funds(&self, catalog: &str) -> Result<FundListing, ServiceError> {
        if !self.mapping.has_fund_filtering(catalog) {
            debug!(catalog, "catalog has no fund column");
            return Ok(FundListing {
                funds: Vec::new(),
                fund_filtering_available: false,
            });
        }
        let funds = logged("list_funds", self.repository.list_funds(catalog))?;
        Ok(FundListing {
            funds: funds.into_iter().map(|f| f.fund).collect(),
            fund_filtering_available: true,
        })
    }

    /// Every record matching `request`.
    pub fn download(&self, request: &RawDataRequest) -> Result<Vec<DataRecord>, ServiceError> {
        logged("fetch_raw", self.repository.fetch(request))
    }

    /// One batch of the records matching `request`.
    pub fn download_batched(
        &self,
        request: &RawDataRequest,
        batch: BatchSpec,
    ) -> Result<BatchedResponse<DataRecord>, ServiceError> {
        let full = self.download(request)?;
        Ok(paginate(full, batch.batch_size, batch.batch_id))
    }

    /// Validates `payload` and downloads in the mode it selects.
    pub fn handle_download(&self, payload: RawDataPayload) -> Result<DownloadResult, ServiceError> {
        let d = dto::validate_raw(payload, &self.mapping)?;
        match d.batch {
            Some(batch) => self.download_batched(&d.request, batch).map(DownloadResult::Batch),
            None => self.download(&d.request).map(DownloadResult::Full),
        }
    }
}

/// Securities, fields and market downloads.
pub struct MarketDataService {
    repository: Arc<dyn MarketDataRepository>,
    backend: Backend,
}

impl MarketDataService {
    /// Service over the resolved market-data repository.
    pub fn new(resolved: Resolved<dyn MarketDataRepository>) -> Self {
        Self {
            repository: resolved.repository,
            backend: resolved.backend,
        }
    }

    /// Backend serving this domain.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Security names.
    pub fn list_securities(&self) -> Result<Vec<String>, ServiceError> {
        let securities = logged("list_securities", self.repository.list_securities())?;
        Ok(securities.into_iter().map(|s| s.security).collect())
    }

    /// Field names of `security`.
    pub fn list_fields(&self, security: &str) -> Result<Vec<String>, ServiceError> {
        let fields = logged("list_fields", self.repository.list_fields(security))?;
        Ok(fields.into_iter().map(|f| f.field).collect())
    }

    /// Every observation matching `request`, as flat records.
    pub fn download(&self, request: &MarketDataRequest) -> Result<Vec<DataRecord>, ServiceError> {
        let records = logged("fetch_market", self.repository.fetch(request))?;
        Ok(records.into_iter().map(|r| r.into_record()).collect())
    }

    /// One batch of the observations matching `request`.
    pub fn download_batched(
        &self,
        request: &MarketDataRequest,
        batch: BatchSpec,
    ) -> Result<BatchedResponse<DataRecord>, ServiceError> {
        let full = self.download(request)?;
        Ok(paginate(full, batch.batch_size, batch.batch_id))
    }

    /// Validates `payload` and downloads in the mode it selects.
    pub fn handle_download(&self, payload: MarketDataPayload) -> Result<DownloadResult, ServiceError> {
        let d = dto::validate_market(payload)?;
        match d.batch {
            Some(batch) => self.download_batched(&d.request, batch).map(DownloadResult::Batch),
            None => self.download(&d.request).map(DownloadResult::Full),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::Fund;
    use crate::repo::SyntheticRawDataRepository;

    /// Counts calls and delegates to the synthetic repository.
    struct Counting {
        inner: SyntheticRawDataRepository,
        calls: AtomicUsize,
    }

    impl RawDataRepository for Counting {
        fn list_categories(&self) -> Result<Vec<String>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_categories()
        }
        fn list_funds(&self, catalog: &str) -> Result<Vec<Fund>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_funds(catalog)
        }
        fn fetch(&self, request: &RawDataRequest) -> Result<Vec<DataRecord>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(request)
        }
    }

    fn service() -> (RawDataService, Arc<Counting>) {
        let mapping = Arc::new(FundColumnMapping::builtin());
        let repo = Arc::new(Counting {
            inner: SyntheticRawDataRepository::new(Arc::clone(&mapping)),
            calls: AtomicUsize::new(0),
        });
        let resolved = Resolved {
            repository: Arc::clone(&repo) as Arc<dyn RawDataRepository>,
            backend: Backend::Synthetic,
            fallback_reason: None,
        };
        (RawDataService::new(resolved, mapping), repo)
    }

    fn payload(catalog: &str, fund: Option<&str>, batch_id: Option<i64>) -> RawDataPayload {
        RawDataPayload {
            catalog: Some(catalog.into()),
            fund: fund.map(Into::into),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-25".into()),
            batch_size: Some(10),
            batch_id,
        }
    }

    #[test]
    fn unmapped_funds_short_circuit() {
        let (svc, repo) = service();
        let listing = svc.list_funds("BALANCE_SHEET").unwrap();
        assert!(listing.funds.is_empty());
        assert!(!listing.fund_filtering_available);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);

        let listing = svc.list_funds("CITCO_NAV").unwrap();
        assert!(listing.fund_filtering_available);
        assert!(!listing.funds.is_empty());
    }

    #[test]
    fn validation_failure_never_reaches_the_repository() {
        let (svc, repo) = service();
        let err = svc.handle_download(payload("CITCO_NAV", None, None)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::FundRequired(_))));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn batched_download_pages_the_full_result() {
        let (svc, _) = service();
        let DownloadResult::Full(all) = svc.handle_download(payload("BALANCE_SHEET", None, None)).unwrap() else {
            panic!("expected full download");
        };
        assert_eq!(all.len(), 25);

        let DownloadResult::Batch(last) = svc
            .handle_download(payload("BALANCE_SHEET", None, Some(2)))
            .unwrap()
        else {
            panic!("expected batch");
        };
        assert_eq!(last.total_batches, 3);
        assert_eq!(last.records, all[20..].to_vec());
        assert!(!last.has_more);
    }
}
