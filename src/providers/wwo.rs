//! World Weather Online premium/free local weather API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{parse_url, required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "http://api.worldweatheronline.com/free/v2/weather.ashx";
pub const DEFAULT_PERIOD_HOURS: u32 = 3;

pub struct WwoClient {
    http: Arc<HttpFetcher>,
}

impl WwoClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

/// Forecast period in hours: one of 1, 3, 6, 12, 24.
pub fn period_hours(cfg: &SourceConfig) -> u32 {
    cfg.forecast_type
        .as_deref()
        .and_then(|s| s.trim().trim_end_matches("hr").parse::<u32>().ok())
        .filter(|h| matches!(h, 1 | 3 | 6 | 12 | 24))
        .unwrap_or(DEFAULT_PERIOD_HOURS)
}

pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let key = required(&cfg.api_key, "api_key")?;
    let location = required(&cfg.location, "location")?;
    let tp = period_hours(cfg).to_string();
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL);
    parse_url(
        base,
        &[
            ("key", key),
            ("q", location),
            ("tp", tp.as_str()),
            ("format", "json"),
            ("num_of_days", "5"),
            ("includelocation", "yes"),
            ("cc", "no"),
        ],
    )
}

/// Errors arrive as `{"data": {"error": [{"msg": ...}]}}` or under `results`.
pub fn check_envelope(v: &Value) -> Result<(), FetchError> {
    let err = v
        .pointer("/data/error/0/msg")
        .or_else(|| v.pointer("/results/error/message"))
        .and_then(Value::as_str);
    if let Some(msg) = err {
        return if msg.to_ascii_lowercase().contains("key") {
            Err(FetchError::Auth(msg.to_string()))
        } else {
            Err(FetchError::MalformedResponse(msg.to_string()))
        };
    }
    if v.pointer("/data/weather").is_none() {
        return Err(FetchError::MalformedResponse("no weather data in response".into()));
    }
    Ok(())
}

#[async_trait]
impl ProviderClient for WwoClient {
    fn source(&self) -> Source {
        Source::Wwo
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let url = build_url(cfg)?;
        let json = self
            .http
            .get_json(&url, cfg.max_tries, cfg.api_key.as_deref())
            .await?;
        check_envelope(&json)?;
        Ok(RawPayload::new(Source::Wwo, Utc::now(), RawBody::Json(json))
            .with_location(cfg.location.clone()))
    }
}
