//! `cityforecast` - multi-city weather.gov forecast aggregation
//!
//! Resolves a fixed set of cities to forecast grid cells, fetches each
//! city's multi-day forecast under a bounded admission gate, and caches the
//! merged dataset and icon images for the lifetime of the process.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod delivery;
pub mod error;
pub mod fetcher;
pub mod icon;
pub mod models;
pub mod registry;
pub mod telemetry;
pub mod url_builder;

#[cfg(test)]
mod testing;

// Re-export core types for public API
pub use aggregator::{AdmissionGate, AggregationReport, CityFailure, ForecastAggregator, Phase};
pub use cache::DataCache;
pub use config::ForecastConfig;
pub use delivery::{CompletionContext, CompletionQueue, completion_context};
pub use error::{ErrorKind, FetchError, ForecastError};
pub use fetcher::{Fetch, HttpFetcher};
pub use icon::IconImage;
pub use models::{
    CityForecast, Coordinates, ForecastDataset, ForecastPeriod, GridLocation, LocationPointInfo,
    TemperatureUnit,
};
pub use registry::{City, CityRegistry};
pub use url_builder::RequestUrlBuilder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
