//! Decoding of weather.gov point and forecast documents
//!
//! Both documents bury the useful fields inside wrapper objects
//! (`properties`, `relativeLocation.properties`). The wire shapes mirror
//! that nesting and are flattened into the public models here. Missing or
//! mistyped fields are a decoding error, never a default.

use crate::FetchError;
use crate::models::{CityForecast, GridLocation, LocationPointInfo};
use tracing::instrument;

/// Decode a `/points/{lat},{lon}` response
#[instrument(level = "debug", skip_all, fields(bytes = bytes.len()))]
pub fn decode_location_point(bytes: &[u8]) -> Result<LocationPointInfo, FetchError> {
    let document: weather_gov::PointDocument = serde_json::from_slice(bytes)
        .map_err(|e| FetchError::decoding("location point document", e))?;
    Ok(document.into())
}

/// Decode a `/gridpoints/.../forecast` response.
///
/// The document names no city; the returned forecast has an empty `city`
/// and no `state` until the caller stamps them.
#[instrument(level = "debug", skip_all, fields(bytes = bytes.len()))]
pub fn decode_city_forecast(bytes: &[u8]) -> Result<CityForecast, FetchError> {
    let document: weather_gov::ForecastDocument = serde_json::from_slice(bytes)
        .map_err(|e| FetchError::decoding("forecast document", e))?;
    Ok(CityForecast::new(
        String::new(),
        None,
        document.properties.periods,
    ))
}

/// weather.gov response structures
mod weather_gov {
    use super::{GridLocation, LocationPointInfo};
    use crate::models::ForecastPeriod;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct PointDocument {
        pub properties: PointProperties,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PointProperties {
        pub grid_id: String,
        pub grid_x: i64,
        pub grid_y: i64,
        pub forecast: String,
        pub forecast_hourly: String,
        pub relative_location: RelativeLocation,
    }

    #[derive(Debug, Deserialize)]
    pub struct RelativeLocation {
        pub properties: RelativeLocationProperties,
    }

    #[derive(Debug, Deserialize)]
    pub struct RelativeLocationProperties {
        pub city: String,
        pub state: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ForecastDocument {
        pub properties: ForecastProperties,
    }

    #[derive(Debug, Deserialize)]
    pub struct ForecastProperties {
        pub periods: Vec<ForecastPeriod>,
    }

    impl From<PointDocument> for LocationPointInfo {
        fn from(document: PointDocument) -> Self {
            let p = document.properties;
            let place = p.relative_location.properties;
            Self {
                grid: GridLocation::new(p.grid_id, p.grid_x, p.grid_y),
                forecast_url: p.forecast,
                forecast_hourly_url: p.forecast_hourly,
                city: place.city,
                state: place.state,
            }
        }
    }
}
