//! Fixed list of cities the forecast is aggregated over

use crate::models::Coordinates;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// A named city with its decimal coordinates
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub coordinates: Coordinates,
}

impl City {
    #[must_use]
    pub fn new<S: Into<String>>(name: S, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            coordinates: Coordinates::new(latitude, longitude),
        }
    }
}

/// Immutable city list
#[derive(Debug, Clone, Default)]
pub struct CityRegistry {
    cities: Vec<City>,
}

impl CityRegistry {
    /// Build a registry from an explicit list.
    ///
    /// Names are expected to be unique. Duplicates are accepted but logged:
    /// the dataset is keyed by name, so the last one written wins.
    #[must_use]
    pub fn new(cities: Vec<City>) -> Self {
        let registry = Self { cities };
        if registry.has_duplicate_names() {
            warn!("City registry contains duplicate names; later results will overwrite earlier ones");
        }
        registry
    }

    /// The compiled-in city list
    #[must_use]
    pub fn reference() -> Self {
        Self::new(vec![
            City::new("Cupertino", 37.323_056, -122.031_944),
            City::new("Denver", 39.740_105, -104.987_429),
            City::new("Chicago", 41.881_944, -87.627_778),
            City::new("New York", 40.712_778, -74.006_111),
            // London, KY
            City::new("London", 37.128_767, -84.083_901),
        ])
    }

    #[must_use]
    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.cities.iter().any(|c| c.name == name)
    }

    #[must_use]
    pub fn has_duplicate_names(&self) -> bool {
        let mut seen = HashSet::new();
        !self.cities.iter().all(|c| seen.insert(c.name.as_str()))
    }
}
