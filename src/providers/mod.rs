// src/providers/mod.rs
//! Provider clients: one per [`Source`], each producing a [`RawPayload`] in
//! its provider-specific shape.

pub mod aeris;
pub mod darksky;
pub mod http;
pub mod nws;
pub mod owm;
pub mod ukmo;
pub mod wu;
pub mod wwo;
pub mod xtide;
pub mod zambretti;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{EngineConfig, SourceConfig};
use crate::error::FetchError;
use crate::types::{RawPayload, Source};

pub use http::HttpFetcher;
pub use xtide::{StaticTideTable, TideTable, XTideProgram};
pub use zambretti::{MemoryObservations, ObservationSource};

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn source(&self) -> Source;
    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError>;
}

/// Time source for the locally computed providers.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Collaborators the clients are built from.
pub struct ClientDeps {
    pub http: Arc<HttpFetcher>,
    pub observations: Arc<dyn ObservationSource>,
    /// Overrides the tide program configured for XTide.
    pub tides: Option<Arc<dyn TideTable>>,
    pub clock: Clock,
}

impl ClientDeps {
    pub fn new(cfg: &EngineConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: Arc::new(HttpFetcher::new(cfg.fetch_timeout())?),
            observations: Arc::new(MemoryObservations::default()),
            tides: None,
            clock: system_clock(),
        })
    }
}

pub fn client_for(source: Source, cfg: &SourceConfig, deps: &ClientDeps) -> Arc<dyn ProviderClient> {
    let http = deps.http.clone();
    match source {
        Source::Nws => Arc::new(nws::NwsClient::new(http)),
        Source::Wu => Arc::new(wu::WuClient::new(http)),
        Source::Owm => Arc::new(owm::OwmClient::new(http)),
        Source::Ukmo => Arc::new(ukmo::UkmoClient::new(http)),
        Source::Aeris => Arc::new(aeris::AerisClient::new(http)),
        Source::Wwo => Arc::new(wwo::WwoClient::new(http)),
        Source::DarkSky => Arc::new(darksky::DarkSkyClient::new(http)),
        Source::Zambretti => Arc::new(zambretti::ZambrettiClient::new(
            deps.observations.clone(),
            deps.clock.clone(),
        )),
        Source::XTide => {
            let table = deps.tides.clone().unwrap_or_else(|| {
                Arc::new(XTideProgram::new(
                    cfg.prog.clone().unwrap_or_else(|| xtide::DEFAULT_PROG.to_string()),
                ))
            });
            Arc::new(xtide::XTideClient::new(table, deps.clock.clone()))
        }
    }
}

/// One client per configured provider section.
pub fn build_clients(
    cfg: &EngineConfig,
    deps: &ClientDeps,
) -> BTreeMap<Source, Arc<dyn ProviderClient>> {
    cfg.providers
        .iter()
        .map(|(src, sc)| (*src, client_for(*src, sc, deps)))
        .collect()
}

/// Required option; a missing value is a configuration problem that persists
/// until the config changes, hence `Auth`.
pub(crate) fn required<'a>(v: &'a Option<String>, name: &str) -> Result<&'a str, FetchError> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with("INSERT_"))
        .ok_or_else(|| FetchError::Auth(format!("{name} not configured")))
}

pub(crate) fn parse_url(base: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| FetchError::MalformedResponse(format!("bad url {base}: {e}")))
}
