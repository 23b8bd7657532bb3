//! Forecast engine daemon.
//! Loads config, opens the record store and ticks the engine on a fixed
//! interval until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forecast_engine::config::{load_config_default, ENV_CONFIG_PATH, DEFAULT_CONFIG_TOML};
use forecast_engine::metrics::install_prometheus;
use forecast_engine::providers::ClientDeps;
use forecast_engine::scheduler::{spawn_engine_scheduler, SchedulerCfg};
use forecast_engine::store::StoreOptions;
use forecast_engine::{ForecastEngine, ForecastStore};

/// Compact logs by default; `FORECAST_LOG_JSON=1` switches to JSON lines.
/// The filter comes from `RUST_LOG` when set.
fn enable_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("forecast_engine=info,forecast=info,warn"));

    let json = std::env::var("FORECAST_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    enable_tracing();

    let config = load_config_default().context("loading forecast config")?;
    if let Some(listen) = &config.metrics_listen {
        install_prometheus(listen)?;
        info!(%listen, "prometheus exporter listening");
    }

    let store = ForecastStore::open_with(
        &config.database_path,
        StoreOptions {
            max_tries: config.db_max_tries,
            retry_wait: Duration::from_millis(config.db_retry_wait_ms),
            ..StoreOptions::default()
        },
    )
    .with_context(|| format!("opening store {}", config.database_path.display()))?;

    let deps = ClientDeps::new(&config).context("building http client")?;
    let tick = Duration::from_secs(config.tick_secs);
    info!(
        providers = config.providers.len(),
        db = %config.database_path.display(),
        tick_secs = config.tick_secs,
        "forecast engine starting"
    );
    let engine = ForecastEngine::from_config(config, &deps, Arc::new(store));

    let config_path = std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_TOML));
    let handle = spawn_engine_scheduler(
        engine,
        deps,
        SchedulerCfg {
            tick,
            config_path: Some(config_path),
        },
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    handle.abort();
    Ok(())
}
