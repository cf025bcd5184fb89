mod api;
mod assets;
mod balance;
mod config;
mod exchange;
mod execution;
mod healthcheck;
mod metrics;
mod pipeline;
mod signal;
mod storage;
mod strategy;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use config::Config;
use exchange::hyperliquid::HyperliquidClient;
use exchange::ExchangeClient;
use strategy::StrategyRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let prometheus_handle = metrics::init();
    let cfg = Config::from_env()?;
    tracing::info!(environment = %cfg.environment, "signalbridge_starting");

    healthcheck::wait_for_postgres(&cfg.database_url).await?;
    let db = storage::postgres::create_pool(&cfg.database_url).await?;
    storage::postgres::ensure_schema(&db).await?;

    let private_key = cfg
        .hyperliquid_private_key
        .as_deref()
        .context("no exchange private key configured for this environment")?;
    let exchange: Arc<dyn ExchangeClient> = Arc::new(HyperliquidClient::new(
        &cfg.hyperliquid_api_url,
        private_key,
        cfg.environment != "testnet",
    )?);

    // Known strategies are registered up front so the operator surface shows
    // them before the first signal arrives.
    let registry = StrategyRegistry::new();
    for strategy_id in ["IMBA_HYPER", "IMBA_TREND"] {
        registry.ensure(strategy_id).await;
    }

    let pipeline = Arc::new(pipeline::Pipeline::new(
        registry,
        exchange.clone(),
        Some(db.clone()),
        &cfg,
    ));

    let balance = Arc::new(balance::BalanceCache::new(
        exchange.clone(),
        Duration::from_secs(cfg.balance_cache_secs),
        Duration::from_secs(cfg.balance_cache_rate_limited_secs),
    ));

    let api_state = Arc::new(api::state::ApiState {
        pipeline,
        db: Some(db),
        balance,
        environment: cfg.environment.clone(),
        exchange_name: exchange.exchange_name().to_string(),
        start_time: std::time::Instant::now(),
        prometheus: prometheus_handle,
    });

    let api_port = cfg.api_port;
    let server = tokio::spawn(async move { api::serve(api_state, api_port).await });

    tracing::info!(port = api_port, "signalbridge_running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("signalbridge_shutdown");
        }
        result = server => {
            match result {
                Ok(Ok(())) => tracing::error!("api_server_exited_unexpectedly"),
                Ok(Err(e)) => tracing::error!(error = %e, "api_server_fatal"),
                Err(e) => tracing::error!(error = %e, "api_server_panicked"),
            }
        }
    }

    tracing::info!("signalbridge_stopped");
    Ok(())
}
