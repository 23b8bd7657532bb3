// tests/metrics_engine.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use forecast_engine::providers::{ClientDeps, StaticTideTable};
use forecast_engine::{EngineConfig, ForecastEngine, ForecastStore};
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::test]
async fn tick_publishes_fetch_series() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let now = Utc.with_ymd_and_hms(2013, 6, 20, 0, 0, 0).unwrap();
    let cfg = EngineConfig::from_toml_str("[providers.xtide]\nlocation = \"Boston\"\n").unwrap();
    let mut deps = ClientDeps::new(&cfg).unwrap();
    deps.tides = Some(Arc::new(StaticTideTable::new([
        "Boston,2013.06.20,01:48,-0.71 ft,Low Tide",
        "Boston,2013.06.20,08:02,10.3 ft,High Tide",
    ])));
    deps.clock = Arc::new(move || now);

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ForecastStore::open(&dir.path().join("fc.sdb")).unwrap());
    let mut engine = ForecastEngine::from_config(cfg, &deps, store);
    engine.tick(now).await;

    let out = handle.render();
    assert!(out.contains("forecast_fetch_total"));
    assert!(out.contains("forecast_records_upserted_total"));
    assert!(out.contains("forecast_fetch_ms"));
    assert!(out.contains("forecast_tick_last_run_ts"));
}
