//! Weather Underground JSON forecasts (`hourly10day` or `forecast10day`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "http://api.wunderground.com/api";
pub const DEFAULT_FORECAST_TYPE: &str = "hourly10day";

pub struct WuClient {
    http: Arc<HttpFetcher>,
}

impl WuClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

pub fn forecast_type(cfg: &SourceConfig) -> &str {
    cfg.forecast_type.as_deref().unwrap_or(DEFAULT_FORECAST_TYPE)
}

pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let key = required(&cfg.api_key, "api_key")?;
    let location = required(&cfg.location, "location")?;
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL).trim_end_matches('/');
    let location = location.replace(' ', "%20");
    Ok(format!("{base}/{key}/{}/q/{location}.json", forecast_type(cfg)))
}

/// WU reports errors inside a 200 response under `response.error`.
pub fn check_envelope(v: &Value) -> Result<(), FetchError> {
    let Some(err) = v.pointer("/response/error") else {
        return Ok(());
    };
    let kind = err.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let desc = err
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let msg = format!("{kind}: {desc}");
    if kind.contains("key") {
        Err(FetchError::Auth(msg))
    } else {
        Err(FetchError::MalformedResponse(msg))
    }
}

#[async_trait]
impl ProviderClient for WuClient {
    fn source(&self) -> Source {
        Source::Wu
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let url = build_url(cfg)?;
        let json = self
            .http
            .get_json(&url, cfg.max_tries, cfg.api_key.as_deref())
            .await?;
        check_envelope(&json)?;
        Ok(RawPayload::new(Source::Wu, Utc::now(), RawBody::Json(json))
            .with_location(cfg.location.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bad_key_is_auth() {
        let v = json!({"response": {"error": {"type": "keynotfound", "description": "this key does not exist"}}});
        assert!(matches!(check_envelope(&v), Err(FetchError::Auth(_))));
        let v = json!({"response": {"error": {"type": "querynotfound"}}});
        assert!(matches!(check_envelope(&v), Err(FetchError::MalformedResponse(_))));
        assert!(check_envelope(&json!({"hourly_forecast": []})).is_ok());
    }

    #[test]
    fn url_layout() {
        let cfg = SourceConfig {
            api_key: Some("abc".into()),
            location: Some("pws:KMABOSTO32".into()),
            ..SourceConfig::for_source(Source::Wu)
        };
        assert_eq!(
            build_url(&cfg).unwrap(),
            "http://api.wunderground.com/api/abc/hourly10day/q/pws:KMABOSTO32.json"
        );
    }
}
