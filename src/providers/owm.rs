//! OpenWeatherMap 5 day / 3 hour forecast.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{parse_url, required, HttpFetcher, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_URL: &str = "http://api.openweathermap.org/data/2.5/forecast";

pub struct OwmClient {
    http: Arc<HttpFetcher>,
}

impl OwmClient {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

/// Location query parameters: `city,cc`, `lat,lon` or a numeric city id.
pub fn location_params(location: &str) -> Vec<(&'static str, String)> {
    let loc = location.trim();
    match loc.rfind(',') {
        Some(i) if loc.len() - i == 3 => vec![("q", loc.to_string())],
        Some(i) => vec![
            ("lat", loc[..i].trim().to_string()),
            ("lon", loc[i + 1..].trim().to_string()),
        ],
        None => vec![("id", loc.to_string())],
    }
}

pub fn build_url(cfg: &SourceConfig) -> Result<String, FetchError> {
    let key = required(&cfg.api_key, "api_key")?;
    let location = required(&cfg.location, "location")?;
    let base = cfg.url.as_deref().unwrap_or(DEFAULT_URL);
    let loc = location_params(location);
    let mut params: Vec<(&str, &str)> = vec![("APPID", key)];
    params.extend(loc.iter().map(|(k, v)| (*k, v.as_str())));
    parse_url(base, &params)
}

/// OWM echoes an HTTP-like `cod` in the body.
pub fn check_envelope(v: &Value) -> Result<(), FetchError> {
    let cod = match v.get("cod") {
        Some(Value::String(s)) => s.parse::<u16>().ok(),
        Some(Value::Number(n)) => n.as_u64().map(|n| n as u16),
        _ => None,
    };
    let msg = v
        .get("message")
        .map(|m| m.to_string())
        .unwrap_or_default();
    match cod {
        None | Some(200) => Ok(()),
        Some(401) => Err(FetchError::Auth(msg)),
        Some(429) => Err(FetchError::RateLimit { retry_after: None }),
        Some(c) => Err(FetchError::MalformedResponse(format!("cod {c}: {msg}"))),
    }
}

#[async_trait]
impl ProviderClient for OwmClient {
    fn source(&self) -> Source {
        Source::Owm
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let url = build_url(cfg)?;
        let json = self
            .http
            .get_json(&url, cfg.max_tries, cfg.api_key.as_deref())
            .await?;
        check_envelope(&json)?;
        Ok(RawPayload::new(Source::Owm, Utc::now(), RawBody::Json(json))
            .with_location(cfg.location.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_forms() {
        assert_eq!(location_params("Boston,US"), vec![("q", "Boston,US".to_string())]);
        assert_eq!(
            location_params("42.36,-71.06"),
            vec![("lat", "42.36".to_string()), ("lon", "-71.06".to_string())]
        );
        assert_eq!(location_params("4930956"), vec![("id", "4930956".to_string())]);
    }

    #[test]
    fn cod_envelope() {
        assert!(check_envelope(&json!({"cod": "200", "list": []})).is_ok());
        assert!(matches!(
            check_envelope(&json!({"cod": 401, "message": "Invalid API key"})),
            Err(FetchError::Auth(_))
        ));
        assert!(matches!(
            check_envelope(&json!({"cod": "404", "message": "city not found"})),
            Err(FetchError::MalformedResponse(_))
        ));
    }
}
