//! Dark Sky forecast API (hourly or daily blocks).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{parse_url, required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "https://api.darksky.net/forecast";

pub struct DarkSkyClient {
    http: Arc<HttpFetcher>,
}

impl DarkSkyClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

pub fn wants_daily(cfg: &SourceConfig) -> bool {
    cfg.forecast_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("daily"))
}

/// `flags` stays in the response: it carries the unit system.
pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let key = required(&cfg.api_key, "api_key")?;
    let location = required(&cfg.location, "location")?;
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL).trim_end_matches('/');
    let exclude = if wants_daily(cfg) {
        "currently,minutely,hourly,alerts"
    } else {
        "currently,minutely,daily,alerts"
    };
    let lang = cfg.language.as_deref().unwrap_or("en");
    let mut params = vec![("exclude", exclude), ("lang", lang), ("units", "us")];
    if cfg.extend_hourly && !wants_daily(cfg) {
        params.push(("extend", "hourly"));
    }
    parse_url(&format!("{base}/{key}/{location}"), &params)
}

#[async_trait]
impl ProviderClient for DarkSkyClient {
    fn source(&self) -> Source {
        Source::DarkSky
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let url = build_url(cfg)?;
        let json = self
            .http
            .get_json(&url, cfg.max_tries, cfg.api_key.as_deref())
            .await?;
        if let Some(err) = json.get("error").and_then(Value::as_str) {
            return Err(FetchError::MalformedResponse(err.to_string()));
        }
        Ok(RawPayload::new(Source::DarkSky, Utc::now(), RawBody::Json(json))
            .with_location(cfg.location.clone()))
    }
}
