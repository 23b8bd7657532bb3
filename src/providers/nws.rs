//! US National Weather Service point forecast matrices (PFM text product).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{parse_url, required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "http://forecast.weather.gov/product.php";

pub struct NwsClient {
    http: Arc<HttpFetcher>,
}

impl NwsClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let foid = required(&cfg.foid, "foid")?;
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL);
    parse_url(
        base,
        &[
            ("site", "NWS"),
            ("product", "PFM"),
            ("format", "txt"),
            ("issuedby", foid),
        ],
    )
}

#[async_trait]
impl ProviderClient for NwsClient {
    fn source(&self) -> Source {
        Source::Nws
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let lid = required(&cfg.lid, "lid")?;
        let url = build_url(cfg)?;
        let text = self.http.get_text(&url, cfg.max_tries, None).await?;
        if !text.to_ascii_uppercase().contains(&lid.to_ascii_uppercase()) {
            return Err(FetchError::MalformedResponse(format!(
                "no forecast block for {lid} in product"
            )));
        }
        Ok(RawPayload::new(Source::Nws, Utc::now(), RawBody::Text(text))
            .with_location(Some(lid.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_uses_office_id() {
        let cfg = SourceConfig {
            foid: Some("GYX".into()),
            lid: Some("MEZ020".into()),
            ..SourceConfig::for_source(Source::Nws)
        };
        assert_eq!(
            build_url(&cfg).unwrap(),
            "http://forecast.weather.gov/product.php?site=NWS&product=PFM&format=txt&issuedby=GYX"
        );
    }
}
