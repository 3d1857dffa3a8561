//! Single-request HTTP fetching
//!
//! One call issues exactly one GET; there is no retry. A response only counts
//! as a success if it got through transport, is a real HTTP exchange, carries
//! a 2xx status and has a non-empty body, checked in that order.

use crate::config::ApiConfig;
use crate::{FetchError, ForecastError};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Source of raw response bodies
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// `Fetch` over a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ApiConfig) -> Result<Self, ForecastError> {
        let timeout = Duration::from_secs(config.timeout_seconds.into());

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(name = "http_fetch", level = "debug", skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching {}", url);
        let start_time = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        debug!(
            "HTTP response received: {} in {:.3}s",
            status,
            start_time.elapsed().as_secs_f64()
        );

        if !status.is_success() {
            warn!("Request to {} failed with status {}", url, status);
            return Err(FetchError::RequestFailed {
                status: status.as_u16(),
            });
        }

        // Headers parsed fine, so a failure here is the connection dropping
        // or timing out mid-body.
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(describe(&e)))?;

        if body.is_empty() {
            return Err(FetchError::data_missing(url.as_str()));
        }

        Ok(body.to_vec())
    }
}

fn classify_send_error(e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        return FetchError::invalid_url(describe(&e));
    }
    if is_malformed_response(&e) {
        return FetchError::protocol(describe(&e));
    }
    FetchError::transport(describe(&e))
}

// The peer answered, but not with something hyper could read as HTTP.
fn is_malformed_response(e: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = e.source();
    while let Some(err) = source {
        if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
            return hyper_err.is_parse() || hyper_err.is_parse_status();
        }
        source = err.source();
    }
    false
}

// reqwest's own Display is terse; include the cause chain.
fn describe(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}
