// src/config.rs
//! Engine and per-provider configuration.
//!
//! Loaded once (TOML or JSON) and treated as immutable afterwards. Credentials
//! may be given literally or as `"ENV"`, in which case they are read from
//! `FORECAST_<SOURCE>_API_KEY` / `_CLIENT_ID` / `_CLIENT_SECRET`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Source;

pub const ENV_CONFIG_PATH: &str = "FORECAST_CONFIG_PATH";
pub const DEFAULT_CONFIG_TOML: &str = "config/forecast.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/forecast.json";

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Placeholder prefix shipped in sample configs; treated as "not configured".
const PLACEHOLDER_PREFIX: &str = "INSERT_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    /// Upper bound on provider cycles running at once within a tick.
    pub max_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub max_backoff_multiplier: u32,
    pub backoff_ceiling_secs: u64,
    /// Default retention horizon; providers may override with `max_age_secs`.
    pub max_age_secs: u64,
    pub db_max_tries: u32,
    pub db_retry_wait_ms: u64,
    pub vacuum: bool,
    /// Host tick period used by the bundled scheduler.
    pub tick_secs: u64,
    pub metrics_listen: Option<String>,
    pub providers: BTreeMap<Source, SourceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("forecast.sdb"),
            max_concurrency: 4,
            fetch_timeout_secs: 30,
            max_backoff_multiplier: 8,
            backoff_ceiling_secs: DAY,
            max_age_secs: 7 * DAY,
            db_max_tries: 3,
            db_retry_wait_ms: 500,
            vacuum: false,
            tick_secs: 300,
            metrics_listen: None,
            providers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Filled from the table key when the config is loaded.
    #[serde(skip)]
    pub source: Option<Source>,
    pub enabled: bool,
    pub interval_secs: Option<u64>,
    pub max_age_secs: Option<u64>,
    /// Download attempts per fetch for transient network errors.
    pub max_tries: u32,
    pub api_key: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub location: Option<String>,
    /// NWS location id within the point forecast matrix.
    pub lid: Option<String>,
    /// NWS forecast office id.
    pub foid: Option<String>,
    /// Base URL override (used by tests and mirrors).
    pub url: Option<String>,
    pub forecast_type: Option<String>,
    pub language: Option<String>,
    pub extend_hourly: bool,
    pub hemisphere: Option<String>,
    pub lower_pressure: Option<f64>,
    pub upper_pressure: Option<f64>,
    pub pressure_period_secs: Option<u64>,
    pub winddir_period_secs: Option<u64>,
    /// Tide almanac binary.
    pub prog: Option<String>,
    /// How far ahead to ask the tide almanac for events.
    pub duration_secs: Option<u64>,
    pub save_raw: bool,
    pub save_failed: bool,
    pub diagnostic_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source: None,
            enabled: true,
            interval_secs: None,
            max_age_secs: None,
            max_tries: 3,
            api_key: None,
            client_id: None,
            client_secret: None,
            location: None,
            lid: None,
            foid: None,
            url: None,
            forecast_type: None,
            language: None,
            extend_hourly: false,
            hemisphere: None,
            lower_pressure: None,
            upper_pressure: None,
            pressure_period_secs: None,
            winddir_period_secs: None,
            prog: None,
            duration_secs: None,
            save_raw: false,
            save_failed: false,
            diagnostic_dir: None,
        }
    }
}

/// Base refresh interval per provider when the config doesn't set one.
pub fn default_interval(source: Source) -> Duration {
    Duration::from_secs(match source {
        Source::Zambretti => 600,
        Source::XTide => 14 * DAY,
        _ => 3 * HOUR,
    })
}

impl SourceConfig {
    pub fn for_source(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn source(&self) -> Option<Source> {
        self.source
    }

    pub fn interval(&self) -> Duration {
        match (self.interval_secs, self.source) {
            (Some(s), _) => Duration::from_secs(s),
            (None, Some(src)) => default_interval(src),
            (None, None) => Duration::from_secs(3 * HOUR),
        }
    }

    /// Retention override, if any. XTide keeps four weeks by default.
    pub fn max_age(&self) -> Option<Duration> {
        match (self.max_age_secs, self.source) {
            (Some(s), _) => Some(Duration::from_secs(s)),
            (None, Some(Source::XTide)) => Some(Duration::from_secs(28 * DAY)),
            _ => None,
        }
    }

    pub fn tide_duration(&self) -> Duration {
        self.duration_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.interval() * 2)
    }

    pub fn is_northern(&self) -> bool {
        !matches!(
            self.hemisphere.as_deref().map(str::to_ascii_uppercase).as_deref(),
            Some("SOUTH") | Some("S")
        )
    }

    /// Stable digest of this section; an auth block is lifted when it changes.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Replaces `"ENV"` credentials with values from the environment.
    pub fn resolve_credentials(&mut self) {
        let Some(src) = self.source else { return };
        let tag = src.env_tag();
        resolve_env(&mut self.api_key, &format!("FORECAST_{tag}_API_KEY"));
        resolve_env(&mut self.client_id, &format!("FORECAST_{tag}_CLIENT_ID"));
        resolve_env(
            &mut self.client_secret,
            &format!("FORECAST_{tag}_CLIENT_SECRET"),
        );
    }

    /// Checks the options each provider needs. An error disables the provider.
    pub fn validate(&self) -> Result<()> {
        let src = self.source.ok_or_else(|| anyhow!("source not set"))?;
        let need = |name: &str, v: &Option<String>| -> Result<()> {
            if is_set(v) {
                Ok(())
            } else {
                Err(anyhow!("{src}: {name} is not specified"))
            }
        };
        match src {
            Source::Nws => {
                need("lid", &self.lid)?;
                need("foid", &self.foid)?;
            }
            Source::Wu | Source::Owm | Source::Ukmo | Source::Wwo | Source::DarkSky => {
                need("api_key", &self.api_key)?;
                need("location", &self.location)?;
            }
            Source::Aeris => {
                need("client_id", &self.client_id)?;
                need("client_secret", &self.client_secret)?;
                need("location", &self.location)?;
            }
            Source::XTide => need("location", &self.location)?,
            Source::Zambretti => {
                if let (Some(lo), Some(hi)) = (self.lower_pressure, self.upper_pressure) {
                    if lo >= hi {
                        return Err(anyhow!("{src}: lower_pressure must be below upper_pressure"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_set(v: &Option<String>) -> bool {
    v.as_deref()
        .map(str::trim)
        .is_some_and(|s| !s.is_empty() && !s.starts_with(PLACEHOLDER_PREFIX))
}

fn resolve_env(slot: &mut Option<String>, var: &str) {
    if slot.as_deref().map(str::trim) == Some("ENV") {
        *slot = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
    }
}

impl EngineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.backoff_ceiling_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Retention horizon for one provider.
    pub fn retention_for(&self, source: Source) -> Duration {
        self.providers
            .get(&source)
            .and_then(SourceConfig::max_age)
            .unwrap_or_else(|| self.max_age())
    }

    /// Attaches table keys to sections and resolves env credentials.
    pub fn finalize(mut self) -> Self {
        for (src, cfg) in self.providers.iter_mut() {
            cfg.source = Some(*src);
            cfg.resolve_credentials();
        }
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s).context("parsing forecast config (toml)")?;
        Ok(cfg.finalize())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig =
            serde_json::from_str(s).context("parsing forecast config (json)")?;
        Ok(cfg.finalize())
    }
}

/// Load config from an explicit path. Format is picked by extension.
pub fn load_config_from(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading forecast config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "json" => EngineConfig::from_json_str(&content),
        _ => EngineConfig::from_toml_str(&content),
    }
}

/// Load config using env var + fallbacks:
/// 1) $FORECAST_CONFIG_PATH
/// 2) config/forecast.toml
/// 3) config/forecast.json
///
/// With none present the defaults (no providers) are returned.
pub fn load_config_default() -> Result<EngineConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let toml_p = PathBuf::from(DEFAULT_CONFIG_TOML);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_CONFIG_JSON);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(EngineConfig::default())
}
