//! Startup choice between live and synthetic repositories.
//!
//! For each domain: connect, probe with the cheapest listing, and fall back to
//! the synthetic repository on any failure. The failure is logged and kept in
//! [`Resolved::fallback_reason`]; it never reaches a request.
//!
//! The binary builds one [`RepositoryResolver`] and resolves both domains once.

use std::sync::{Arc, OnceLock};

use secrecy::SecretString;
use tracing::{info, warn};

use crate::db::{PgExecutor, PoolSettings};
use crate::environment::EnvironmentTag;
use crate::fund_mapping::FundColumnMapping;
use crate::query::WarehouseLayout;
use crate::repo::{
    Backend, ConnectivityError, MarketDataRepository, RawDataRepository, RepoError, SqlExecutor,
    SqlMarketDataRepository, SqlRawDataRepository, SyntheticMarketDataRepository,
    SyntheticRawDataRepository,
};

/// Outcome of resolving one domain.
pub struct Resolved<R: ?Sized> {
    /// The repository to use for the lifetime of the process.
    pub repository: Arc<R>,
    /// Which kind it is.
    pub backend: Backend,
    /// Why the live backend was not used, when it was not.
    pub fallback_reason: Option<String>,
}

impl<R: ?Sized> std::fmt::Debug for Resolved<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("backend", &self.backend)
            .field("fallback_reason", &self.fallback_reason)
            .finish_non_exhaustive()
    }
}

/// Connect, probe, fall back.
pub fn resolve_with<R, C, P, F>(domain: &str, connect: C, probe: P, fallback: F) -> Resolved<R>
where
    R: ?Sized,
    C: FnOnce() -> Result<Arc<R>, ConnectivityError>,
    P: FnOnce(&R) -> Result<(), RepoError>,
    F: FnOnce() -> Arc<R>,
{
    let attempt = connect().and_then(|repo| match probe(repo.as_ref()) {
        Ok(()) => Ok(repo),
        Err(e) => Err(ConnectivityError::Probe(e)),
    });

    match attempt {
        Ok(repository) => {
            info!(domain, backend = %Backend::Live, "using warehouse repository");
            Resolved {
                repository,
                backend: Backend::Live,
                fallback_reason: None,
            }
        }
        Err(e) => {
            warn!(domain, error = %e, "warehouse unavailable, serving synthetic data");
            Resolved {
                repository: fallback(),
                backend: Backend::Synthetic,
                fallback_reason: Some(e.to_string()),
            }
        }
    }
}

type Connector = Box<dyn Fn() -> Result<Arc<dyn SqlExecutor>, ConnectivityError> + Send + Sync>;

/// Resolves the repositories of both domains over one shared connection pool.
pub struct RepositoryResolver {
    connector: Connector,
    executor: OnceLock<Result<Arc<dyn SqlExecutor>, String>>,
    layout: Arc<WarehouseLayout>,
    mapping: Arc<FundColumnMapping>,
}

impl RepositoryResolver {
    /// Resolver over an arbitrary connector; the connector runs at most once.
    pub fn new<C>(connector: C, layout: Arc<WarehouseLayout>, mapping: Arc<FundColumnMapping>) -> Self
    where
        C: Fn() -> Result<Arc<dyn SqlExecutor>, ConnectivityError> + Send + Sync + 'static,
    {
        Self {
            connector: Box::new(connector),
            executor: OnceLock::new(),
            layout,
            mapping,
        }
    }

    /// Resolver connecting to `target` with a PostgreSQL pool.
    ///
    /// `target` is the connection URL chosen for `environment`; `None` makes
    /// every resolution fall back.
    pub fn postgres(
        environment: EnvironmentTag,
        target: Option<SecretString>,
        pool: PoolSettings,
        layout: Arc<WarehouseLayout>,
        mapping: Arc<FundColumnMapping>,
    ) -> Self {
        let connector = move || {
            let url = target.as_ref().ok_or(ConnectivityError::NoTarget(environment))?;
            let executor = PgExecutor::connect(url, pool)?;
            Ok(Arc::new(executor) as Arc<dyn SqlExecutor>)
        };
        Self::new(connector, layout, mapping)
    }

    fn executor(&self) -> Result<Arc<dyn SqlExecutor>, ConnectivityError> {
        match self
            .executor
            .get_or_init(|| (self.connector)().map_err(|e| e.to_string()))
        {
            Ok(executor) => Ok(Arc::clone(executor)),
            Err(reason) => Err(ConnectivityError::Unavailable(reason.clone())),
        }
    }

    /// Raw-data repository, probed with `list_categories`.
    pub fn resolve_raw(&self) -> Resolved<dyn RawDataRepository> {
        resolve_with(
            "raw-data",
            || {
                let repo = SqlRawDataRepository::new(
                    self.executor()?,
                    Arc::clone(&self.layout),
                    Arc::clone(&self.mapping),
                );
                Ok(Arc::new(repo) as Arc<dyn RawDataRepository>)
            },
            |repo| repo.list_categories().map(drop),
            || Arc::new(SyntheticRawDataRepository::new(Arc::clone(&self.mapping))),
        )
    }

    /// Market-data repository, probed with `list_securities`.
    pub fn resolve_market(&self) -> Resolved<dyn MarketDataRepository> {
        resolve_with(
            "market-data",
            || {
                let repo = SqlMarketDataRepository::new(self.executor()?, Arc::clone(&self.layout));
                Ok(Arc::new(repo) as Arc<dyn MarketDataRepository>)
            },
            |repo| repo.list_securities().map(drop),
            || Arc::new(SyntheticMarketDataRepository),
        )
    }
}
