//! Tide predictions from the XTide almanac.
//!
//! The almanac is opaque: given a location and a time range it yields CSV
//! lines, of which the high/low tide lines become records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;

use super::{required, Clock, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source};

pub const DEFAULT_PROG: &str = "/usr/bin/tide";

#[async_trait]
pub trait TideTable: Send + Sync {
    /// CSV lines `location,YYYY.MM.DD,HH:MM,offset unit,event` in UTC.
    async fn lines(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, FetchError>;
}

/// Runs the `tide` command line program.
pub struct XTideProgram {
    prog: String,
}

impl XTideProgram {
    pub fn new(prog: impl Into<String>) -> Self {
        Self { prog: prog.into() }
    }
}

#[async_trait]
impl TideTable for XTideProgram {
    async fn lines(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, FetchError> {
        let fmt = "%Y-%m-%d %H:%M";
        let out = Command::new(&self.prog)
            .arg("-fc")
            .arg("-df%Y.%m.%d")
            .arg("-tf%H:%M")
            .arg("-z")
            .arg(format!("-l{location}"))
            .arg(format!("-b{}", start.format(fmt)))
            .arg(format!("-e{}", end.format(fmt)))
            .output()
            .await
            .map_err(|e| FetchError::MalformedResponse(format!("cannot run {}: {e}", self.prog)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(FetchError::MalformedResponse(format!(
                "{} exited with {}: {}",
                self.prog,
                out.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Fixed set of almanac lines, filtered to the requested range.
#[derive(Debug, Clone, Default)]
pub struct StaticTideTable {
    lines: Vec<String>,
}

impl StaticTideTable {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TideTable for StaticTideTable {
    async fn lines(
        &self,
        _location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, FetchError> {
        Ok(self
            .lines
            .iter()
            .filter(|l| {
                crate::normalize::xtide::line_time(l).map_or(true, |t| t >= start && t <= end)
            })
            .cloned()
            .collect())
    }
}

pub struct XTideClient {
    table: Arc<dyn TideTable>,
    clock: Clock,
}

impl XTideClient {
    pub fn new(table: Arc<dyn TideTable>, clock: Clock) -> Self {
        Self { table, clock }
    }
}

#[async_trait]
impl ProviderClient for XTideClient {
    fn source(&self) -> Source {
        Source::XTide
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let location = required(&cfg.location, "location")?;
        let now = (self.clock)();
        let end = chrono::Duration::from_std(cfg.tide_duration())
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        let lines = self.table.lines(location, now, end).await?;
        if lines.is_empty() {
            return Err(FetchError::MalformedResponse(format!(
                "no tide predictions for {location}"
            )));
        }
        Ok(RawPayload::new(Source::XTide, now, RawBody::Lines(lines))
            .with_location(Some(location.to_string())))
    }
}
