mod common;

use std::sync::Arc;

use secrecy::ExposeSecret;
use serial_test::serial;

use warehouse_api::config::{DATABASE_URL_VAR, load_config_path};
use warehouse_api::environment::{self, ENVIRONMENT_VAR, EnvironmentSource, EnvironmentTag};
use warehouse_api::fund_mapping::FundColumnMapping;
use warehouse_api::repo::{Backend, RepositoryResolver};

use common::{offline_resolver, write_config};

fn set_env(name: &str, value: &str) {
    // SAFETY: tests touching the process environment are #[serial]
    unsafe { std::env::set_var(name, value) }
}

fn clear_env(name: &str) {
    // SAFETY: tests touching the process environment are #[serial]
    unsafe { std::env::remove_var(name) }
}

#[test]
fn offline_connector_yields_synthetic_with_reason() {
    let resolver = offline_resolver(Arc::new(FundColumnMapping::builtin()));
    let raw = resolver.resolve_raw();
    assert_eq!(raw.backend, Backend::Synthetic);
    assert_eq!(
        raw.fallback_reason.as_deref(),
        Some("no database configured for the development environment")
    );
    // the fallback answers like the real thing
    assert!(!raw.repository.list_categories().unwrap().is_empty());
}

#[test]
#[serial]
fn explicit_environment_variable_wins() {
    set_env(ENVIRONMENT_VAR, "prod");
    let env = environment::resolve(&Default::default());
    clear_env(ENVIRONMENT_VAR);

    assert_eq!(env.tag, EnvironmentTag::Production);
    assert_eq!(env.source, EnvironmentSource::Explicit("prod".into()));
}

#[test]
#[serial]
fn unreachable_database_falls_back_without_error() {
    let cfg_file = write_config(
        r#"
        [database]
        pool_size = 1
        connect_timeout_secs = 1

        [database.urls]
        staging = "postgres://reader@127.0.0.1:1/warehouse"
        "#,
    );
    clear_env(DATABASE_URL_VAR);
    let mut cfg = load_config_path(&cfg_file.path).unwrap();
    cfg.apply_env();

    let mapping = Arc::new(cfg.fund_mapping().unwrap());
    let resolver = RepositoryResolver::postgres(
        EnvironmentTag::Staging,
        cfg.database.take_target(EnvironmentTag::Staging),
        cfg.database.pool_settings(),
        Arc::new(cfg.database.layout().unwrap()),
        mapping,
    );

    let raw = resolver.resolve_raw();
    let market = resolver.resolve_market();
    assert_eq!(raw.backend, Backend::Synthetic);
    assert_eq!(market.backend, Backend::Synthetic);
    assert!(raw.fallback_reason.unwrap().contains("connection pool"));
    assert_eq!(market.repository.list_securities().unwrap().len(), 5);
}

#[test]
#[serial]
fn database_url_overrides_the_config_file() {
    let cfg_file = write_config("[database.urls]\nproduction = \"postgres://prod/wh\"\n");
    set_env(DATABASE_URL_VAR, "postgres://override/wh");
    let mut cfg = load_config_path(&cfg_file.path).unwrap();
    cfg.apply_env();
    clear_env(DATABASE_URL_VAR);

    let target = cfg.database.take_target(EnvironmentTag::Production).unwrap();
    assert_eq!(target.expose_secret(), "postgres://override/wh");
}

#[test]
fn missing_config_file_is_reported_with_its_path() {
    let err = load_config_path("/nonexistent/warehouse.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/warehouse.toml"));
}
