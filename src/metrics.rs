// src/metrics.rs
//! Metric names and one-time descriptors, plus the optional Prometheus
//! exporter the binary can install.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

pub const FETCH_TOTAL: &str = "forecast_fetch_total";
pub const FETCH_ERRORS_TOTAL: &str = "forecast_fetch_errors_total";
pub const RECORDS_UPSERTED_TOTAL: &str = "forecast_records_upserted_total";
pub const FETCH_MS: &str = "forecast_fetch_ms";
pub const TICK_LAST_RUN_TS: &str = "forecast_tick_last_run_ts";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(FETCH_TOTAL, "Provider fetch attempts.");
        describe_counter!(
            FETCH_ERRORS_TOTAL,
            "Provider cycles that failed, labelled by error kind."
        );
        describe_counter!(RECORDS_UPSERTED_TOTAL, "Normalized records written to the store.");
        describe_histogram!(FETCH_MS, "Provider fetch time in milliseconds.");
        describe_gauge!(TICK_LAST_RUN_TS, "Unix ts when the engine last ticked.");
    });
}

/// Installs the Prometheus recorder with its own scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn install_prometheus(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("parsing metrics listen address {listen}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing prometheus exporter")?;
    ensure_metrics_described();
    Ok(())
}
