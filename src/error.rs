//! Error taxonomy shared by provider clients, normalizers and the store.

use std::time::Duration;

use thiserror::Error;

/// Failure to obtain a raw payload from a provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transient: timeouts, connection resets, 5xx.
    #[error("network error: {0}")]
    Network(String),

    /// Persistent until the configuration changes.
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimit { retry_after: Option<Duration> },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

impl FetchError {
    /// Whether an immediate retry within the same fetch makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::RateLimit { .. } => "rate_limit",
            Self::MalformedResponse(_) => "malformed",
        }
    }
}

/// Failure to turn a raw payload into records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("unit conversion failure: {0}")]
    UnitConversionFailure(String),
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRequiredField(_) => "missing_field",
            Self::UnitConversionFailure(_) => "unit_conversion",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Database busy or locked by another writer.
    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("storage failure: {0}")]
    IoFailure(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::WriteConflict(e.to_string())
            }
            _ => Self::IoFailure(e.to_string()),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        Self::IoFailure(format!("connection pool: {e}"))
    }
}

/// Anything that can go wrong in one provider cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::Parse(e) => e.kind(),
            Self::Store(StoreError::WriteConflict(_)) => "write_conflict",
            Self::Store(StoreError::IoFailure(_)) => "io",
        }
    }
}
