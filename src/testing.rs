//! Scripted fetcher and document builders for unit tests

use crate::{Fetch, FetchError};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const BASE: &str = "https://api.test";

pub(crate) fn point_url(latitude: f64, longitude: f64) -> String {
    format!("{BASE}/points/{latitude},{longitude}")
}

pub(crate) fn forecast_url(grid_id: &str, x: i64, y: i64) -> String {
    format!("{BASE}/gridpoints/{grid_id}/{x},{y}/forecast")
}

pub(crate) fn point_body(grid_id: &str, x: i64, y: i64, city: &str, state: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "properties": {
            "gridId": grid_id,
            "gridX": x,
            "gridY": y,
            "forecast": forecast_url(grid_id, x, y),
            "forecastHourly": format!("{}/hourly", forecast_url(grid_id, x, y)),
            "relativeLocation": {
                "properties": { "city": city, "state": state }
            }
        }
    }))
    .unwrap()
}

pub(crate) fn forecast_body(temperatures: &[i32]) -> Vec<u8> {
    let periods: Vec<_> = temperatures
        .iter()
        .enumerate()
        .map(|(i, t)| {
            json!({
                "number": i + 1,
                "name": format!("Period {}", i + 1),
                "startTime": "2022-07-18T06:00:00-05:00",
                "isDaytime": i % 2 == 0,
                "temperature": t,
                "temperatureUnit": "F",
                "shortForecast": "Sunny",
                "detailedForecast": format!("Sunny, with a high near {t}."),
                "icon": "https://api.test/icons/land/day/skc?size=medium"
            })
        })
        .collect();
    serde_json::to_vec(&json!({ "properties": { "periods": periods } })).unwrap()
}

#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Body(Vec<u8>),
    Status(u16),
    Transport,
}

/// Ordering stamps of one completed call, from a shared sequence counter
#[derive(Debug, Clone)]
pub(crate) struct CallSpan {
    pub(crate) url: String,
    pub(crate) started: usize,
    pub(crate) finished: usize,
}

/// `Fetch` that answers from a URL -> response table and records traffic.
/// Unscripted URLs answer 404.
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    responses: HashMap<String, Scripted>,
    delay: Duration,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
    spans: Mutex<Vec<CallSpan>>,
    sequence: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(mut self, url: impl Into<String>, response: Scripted) -> Self {
        self.responses.insert(url.into(), response);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Per-URL delay, overriding `with_delay` for that URL
    pub(crate) fn delay_for(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    pub(crate) fn spans(&self) -> Vec<CallSpan> {
        self.spans.lock().clone()
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().push(url.to_string());
        let started = self.sequence.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(url.as_str()).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let finished = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.spans.lock().push(CallSpan {
            url: url.to_string(),
            started,
            finished,
        });
        match self.responses.get(url.as_str()) {
            Some(Scripted::Body(body)) => Ok(body.clone()),
            Some(Scripted::Status(status)) => Err(FetchError::RequestFailed { status: *status }),
            Some(Scripted::Transport) => Err(FetchError::transport("connection refused")),
            None => Err(FetchError::RequestFailed { status: 404 }),
        }
    }
}
