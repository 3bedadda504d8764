use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use shared_utils::env::get_env_list;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warehouse_api::config::{AppConfig, load_config_path};
use warehouse_api::environment;
use warehouse_api::http::{self, AppState};
use warehouse_api::repo::RepositoryResolver;
use warehouse_api::service::{MarketDataService, RawDataService};
use warehouse_api::upload::UploadForwarder;

#[derive(Parser)]
#[command(version, about = "Warehouse data API server")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,
    /// TOML configuration file; built-in defaults when absent.
    #[arg(long, env = "WAREHOUSE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    /// Verbose logging. `DEBUG=0`, `false`, `off` and `no` (any case) leave it off.
    #[arg(long, env = "DEBUG", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "warehouse_api=debug,tower_http=debug"
    } else {
        "warehouse_api=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Host names are resolved, so `localhost` works as well as literal addresses.
async fn bind(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("cannot bind {host}:{port}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    // 1) Configuration
    let mut cfg = match &cli.config {
        Some(path) => load_config_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    cfg.apply_env();
    let layout = Arc::new(cfg.database.layout()?);
    let mapping = Arc::new(cfg.fund_mapping()?);
    info!(mapped_catalogs = mapping.len(), "fund-column mapping loaded");

    // 2) Environment and repositories, once per process
    let env = environment::resolve(&cfg.environment);
    let resolver = RepositoryResolver::postgres(
        env.tag,
        cfg.database.take_target(env.tag),
        cfg.database.pool_settings(),
        layout,
        Arc::clone(&mapping),
    );
    let (raw, market) = tokio::task::spawn_blocking(move || (resolver.resolve_raw(), resolver.resolve_market()))
        .await
        .context("repository resolution panicked")?;

    // 3) Services and HTTP
    let state = AppState {
        raw: Arc::new(RawDataService::new(raw, mapping)),
        market: Arc::new(MarketDataService::new(market)),
        uploads: Arc::new(UploadForwarder::from_config(&cfg.upload)?),
        environment: env.tag,
    };
    let app = http::router(state, http::cors_layer(&get_env_list("CORS_ORIGINS")));

    let listener = bind(&cli.host, cli.port).await?;
    info!(addr = %listener.local_addr()?, environment = %env.tag, "starting warehouse API");
    axum::serve(listener, app).await?;
    Ok(())
}
