//! Configuration for the forecast engine
//!
//! All values are compiled-in defaults; callers that need something else
//! (tests pointing at a mock server, a wider admission gate) build a config
//! in code and pass it in.

use crate::ForecastError;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForecastConfig {
    /// Weather API endpoint settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Fan-out settings for the aggregator
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Weather API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host every request is built against
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// api.weather.gov rejects requests without a User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Aggregator fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Width of the admission gate (max in-flight requests)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// Default value functions
fn default_base_url() -> String {
    "https://api.weather.gov".to_string()
}

fn default_timeout() -> u32 {
    15
}

fn default_user_agent() -> String {
    concat!("cityforecast/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_concurrency() -> usize {
    1
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl ForecastConfig {
    /// Config targeting a different API host, everything else default
    #[must_use]
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        let mut config = Self::default();
        config.api.base_url = base_url.into();
        config
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.api.base_url.is_empty() {
            self.api.base_url = default_base_url();
        }
        if self.api.timeout_seconds == 0 {
            self.api.timeout_seconds = default_timeout();
        }
        if self.api.user_agent.is_empty() {
            self.api.user_agent = default_user_agent();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.api.timeout_seconds == 0 || self.api.timeout_seconds > 300 {
            return Err(ForecastError::config(
                "API timeout must be between 1 and 300 seconds",
            ));
        }

        if self.fetch.concurrency == 0 {
            return Err(ForecastError::config(
                "Fetch concurrency must be at least 1",
            ));
        }

        if self.fetch.concurrency > 64 {
            return Err(ForecastError::config(
                "Fetch concurrency cannot exceed 64",
            ));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(ForecastError::config(
                "API base URL must be a valid HTTP or HTTPS URL",
            ));
        }

        Ok(())
    }
}
