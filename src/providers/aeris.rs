//! Aeris Weather forecasts endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{parse_url, required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "http://api.aerisapi.com/forecasts";
pub const DEFAULT_FORECAST_TYPE: &str = "1hr";

static LATLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[\d\+\-\.]+\s*,\s*[\d\+\-\.]+\s*$").expect("static regex"));

pub struct AerisClient {
    http: Arc<HttpFetcher>,
}

impl AerisClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let id = required(&cfg.client_id, "client_id")?;
    let secret = required(&cfg.client_secret, "client_secret")?;
    let location = required(&cfg.location, "location")?;
    let filter = cfg.forecast_type.as_deref().unwrap_or(DEFAULT_FORECAST_TYPE);
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL).trim_end_matches('/');
    if LATLON.is_match(location) {
        parse_url(
            &format!("{base}/closest"),
            &[
                ("client_id", id),
                ("client_secret", secret),
                ("p", location),
                ("filter", filter),
            ],
        )
    } else {
        parse_url(
            &format!("{base}/{location}"),
            &[("client_id", id), ("client_secret", secret), ("filter", filter)],
        )
    }
}

/// Aeris wraps every answer in `{success, error, response}`.
pub fn check_envelope(v: &Value) -> Result<(), FetchError> {
    if v.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(());
    }
    let code = v
        .pointer("/error/code")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let desc = v
        .pointer("/error/description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let msg = format!("{code}: {desc}");
    if code.starts_with("invalid_client") || code.starts_with("unauthorized") {
        Err(FetchError::Auth(msg))
    } else if code.starts_with("maxhits") {
        Err(FetchError::RateLimit { retry_after: None })
    } else {
        Err(FetchError::MalformedResponse(msg))
    }
}

#[async_trait]
impl ProviderClient for AerisClient {
    fn source(&self) -> Source {
        Source::Aeris
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let url = build_url(cfg)?;
        let json = self
            .http
            .get_json(&url, cfg.max_tries, cfg.client_secret.as_deref())
            .await?;
        check_envelope(&json)?;
        Ok(RawPayload::new(Source::Aeris, Utc::now(), RawBody::Json(json))
            .with_location(cfg.location.clone()))
    }
}
