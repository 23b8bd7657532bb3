// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod providers;
pub mod query;
pub mod scheduler;
pub mod staleness;
pub mod store;
pub mod types;
pub mod units;
pub mod zambretti;

// ---- Re-exports for stable public API ----
pub use crate::config::{EngineConfig, SourceConfig};
pub use crate::engine::{ForecastEngine, ProviderOutcome, TickReport};
pub use crate::error::{CycleError, FetchError, ParseError, StoreError};
pub use crate::query::QueryFacade;
pub use crate::store::ForecastStore;
pub use crate::types::{Field, ForecastRecord, RawPayload, Source};
