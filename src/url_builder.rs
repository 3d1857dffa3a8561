//! Request URL construction for point lookups and grid forecasts

use crate::FetchError;
use crate::models::{Coordinates, GridLocation};
use reqwest::Url;

/// Builds the two request shapes against a fixed scheme + host
#[derive(Debug, Clone)]
pub struct RequestUrlBuilder {
    base: Url,
}

impl RequestUrlBuilder {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let base = Url::parse(base_url)
            .map_err(|e| FetchError::invalid_url(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::invalid_url(format!(
                "{base_url} cannot carry a path"
            )));
        }
        Ok(Self { base })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `/points/{lat},{lon}`
    pub fn point_url(&self, coordinates: &Coordinates) -> Result<Url, FetchError> {
        if !coordinates.is_finite() {
            return Err(FetchError::invalid_url(format!(
                "non-finite coordinates {coordinates:?}"
            )));
        }
        self.with_segments(&["points", &coordinates.path_segment()])
    }

    /// `/gridpoints/{gridId}/{gridX},{gridY}/forecast`
    pub fn forecast_url(&self, grid: &GridLocation) -> Result<Url, FetchError> {
        if grid.grid_id.trim().is_empty() {
            return Err(FetchError::invalid_url("empty grid id"));
        }
        let cell = format!("{},{}", grid.grid_x, grid.grid_y);
        self.with_segments(&["gridpoints", &grid.grid_id, &cell, "forecast"])
    }

    // Segments are percent-encoded by `Url`; a base path prefix is kept.
    fn with_segments(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::invalid_url(format!("{} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
