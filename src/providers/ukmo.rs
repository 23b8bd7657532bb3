//! UK Met Office DataPoint 3-hourly site forecasts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{parse_url, required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "http://datapoint.metoffice.gov.uk/public/data/val/wxfcs/all/json";

pub struct UkmoClient {
    http: Arc<HttpFetcher>,
}

impl UkmoClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let key = required(&cfg.api_key, "api_key")?;
    let location = required(&cfg.location, "location")?;
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL).trim_end_matches('/');
    parse_url(&format!("{base}/{location}"), &[("res", "3hourly"), ("key", key)])
}

#[async_trait]
impl ProviderClient for UkmoClient {
    fn source(&self) -> Source {
        Source::Ukmo
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let url = build_url(cfg)?;
        let json = self
            .http
            .get_json(&url, cfg.max_tries, cfg.api_key.as_deref())
            .await?;
        if json.get("SiteRep").map_or(true, Value::is_null) {
            return Err(FetchError::MalformedResponse("no SiteRep in response".into()));
        }
        Ok(RawPayload::new(Source::Ukmo, Utc::now(), RawBody::Json(json))
            .with_location(cfg.location.clone()))
    }
}
