//! Forecast periods, per-city forecasts and the keyed dataset

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// City name -> forecast. The unit of caching and delivery.
pub type ForecastDataset = HashMap<String, CityForecast>;

/// Unit a period's temperature is reported in
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    /// Wire symbol, "F" or "C"
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "F",
            TemperatureUnit::Celsius => "C",
        }
    }
}

/// One day or night slot of a multi-day forecast
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    /// 1-based index across the whole forecast span
    pub number: u32,
    /// e.g. "Tonight", "Thursday"
    pub name: String,
    /// ISO 8601 start, kept as sent
    pub start_time: String,
    pub is_daytime: bool,
    /// Temperature in `temperature_unit`, never converted here
    pub temperature: i32,
    pub temperature_unit: TemperatureUnit,
    pub short_forecast: String,
    pub detailed_forecast: String,
    #[serde(rename = "icon")]
    pub icon_url: String,
}

impl ForecastPeriod {
    /// Parsed start time, if the API sent a valid RFC 3339 timestamp
    #[must_use]
    pub fn start(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.start_time).ok()
    }
}

/// Forecast for one resolved city
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CityForecast {
    pub city: String,
    pub state: Option<String>,
    /// Periods in document order
    pub periods: Vec<ForecastPeriod>,
}

/// The two periods that make up calendar-day slot `day`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayPair<'a> {
    /// 1-based day slot
    pub day: u32,
    /// Period numbered `2 * day - 1`
    pub first: Option<&'a ForecastPeriod>,
    /// Period numbered `2 * day`
    pub second: Option<&'a ForecastPeriod>,
}

impl CityForecast {
    #[must_use]
    pub fn new<S: Into<String>>(city: S, state: Option<String>, periods: Vec<ForecastPeriod>) -> Self {
        Self {
            city: city.into(),
            state,
            periods,
        }
    }

    /// Current conditions (first period in the document)
    #[must_use]
    pub fn current_period(&self) -> Option<&ForecastPeriod> {
        self.periods.first()
    }

    /// Look a period up by its `number`, not its position
    #[must_use]
    pub fn period_by_number(&self, number: u32) -> Option<&ForecastPeriod> {
        self.periods.iter().find(|p| p.number == number)
    }

    /// Group periods into calendar-day slots by number.
    ///
    /// Slot `i` pairs numbers `2i - 1` and `2i`. Only slots with at least
    /// one period are returned, in ascending order; a missing half is `None`.
    /// Period number 0 belongs to no slot. On repeated numbers the first
    /// period in the document wins.
    #[must_use]
    pub fn day_pairs(&self) -> Vec<DayPair<'_>> {
        let mut slots: BTreeMap<u32, DayPair<'_>> = BTreeMap::new();

        for period in self.periods.iter().filter(|p| p.number > 0) {
            let day = period.number.div_ceil(2);
            let pair = slots.entry(day).or_insert(DayPair {
                day,
                first: None,
                second: None,
            });
            let half = if period.number % 2 == 1 {
                &mut pair.first
            } else {
                &mut pair.second
            };
            if half.is_none() {
                *half = Some(period);
            }
        }

        slots.into_values().collect()
    }
}
