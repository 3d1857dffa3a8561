//! Geographic coordinates and weather-grid addressing

use serde::{Deserialize, Serialize};

/// Decimal latitude/longitude pair
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Format as the `lat,lon` path segment used by point lookups
    #[must_use]
    pub fn path_segment(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// A forecast grid cell: issuing office plus X/Y index
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct GridLocation {
    pub grid_id: String,
    pub grid_x: i64,
    pub grid_y: i64,
}

impl GridLocation {
    #[must_use]
    pub fn new<S: Into<String>>(grid_id: S, grid_x: i64, grid_y: i64) -> Self {
        Self {
            grid_id: grid_id.into(),
            grid_x,
            grid_y,
        }
    }
}

/// Flattened result of a point lookup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocationPointInfo {
    pub grid: GridLocation,
    pub forecast_url: String,
    pub forecast_hourly_url: String,
    /// Place name the API resolved the coordinates to
    pub city: String,
    pub state: String,
}
