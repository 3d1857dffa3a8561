//! Data models for the forecast engine
//!
//! - Location: coordinates, grid cells and resolved point metadata
//! - Forecast: per-city period sequences and the keyed dataset

pub mod forecast;
pub mod location;

// Re-export all public types for convenient access
pub use forecast::{CityForecast, DayPair, ForecastDataset, ForecastPeriod, TemperatureUnit};
pub use location::{Coordinates, GridLocation, LocationPointInfo};
