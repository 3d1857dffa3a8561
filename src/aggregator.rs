//! Two-phase, concurrency-bounded forecast aggregation
//!
//! Phase 1 resolves every registry city to a grid location; phase 2 fetches
//! the forecast document for every city phase 1 resolved. Each city runs as
//! its own task on the Tokio pool and every network call must first pass the
//! shared admission gate, so at most `width` requests are ever in flight.
//! A phase only ends once all of its tasks are terminal.
//!
//! Failures never cross a city boundary: a city that fails at any step is
//! dropped from the result, and the round carries on.

use crate::decoder::{decode_city_forecast, decode_location_point};
use crate::delivery::CompletionContext;
use crate::models::{CityForecast, Coordinates, ForecastDataset, GridLocation, LocationPointInfo};
use crate::registry::CityRegistry;
use crate::url_builder::RequestUrlBuilder;
use crate::{ErrorKind, Fetch, FetchError};
use futures::future::join_all;
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Counting gate bounding in-flight network calls, with instrumentation
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Semaphore,
    width: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    admitted: AtomicUsize,
}

/// Held for the duration of one network call
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a AdmissionGate,
    _permit: SemaphorePermit<'a>,
}

impl AdmissionGate {
    /// A width of 0 is treated as 1
    #[must_use]
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            semaphore: Semaphore::new(width),
            width,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            admitted: AtomicUsize::new(0),
        }
    }

    pub async fn admit(&self) -> Result<GatePermit<'_>, FetchError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::internal("admission gate closed"))?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.admitted.fetch_add(1, Ordering::SeqCst);

        Ok(GatePermit {
            gate: self,
            _permit: permit,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously admitted calls seen so far
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total calls admitted so far
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        // Runs before the semaphore permit is returned.
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Which round a city dropped out in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PointLookup,
    Forecast,
}

/// Diagnostic record of one dropped city
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityFailure {
    pub city: String,
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
}

/// Dataset plus the cities that were dropped on the way
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub dataset: ForecastDataset,
    pub failures: Vec<CityFailure>,
}

/// Everything a per-city task needs, cheap to clone into the task
#[derive(Clone)]
struct CityTask {
    fetcher: Arc<dyn Fetch>,
    urls: Arc<RequestUrlBuilder>,
    gate: Arc<AdmissionGate>,
}

impl CityTask {
    async fn resolve_point(self, coordinates: Coordinates) -> Result<LocationPointInfo, FetchError> {
        let url = self.urls.point_url(&coordinates)?;
        let bytes = self.fetch_gated(&url).await?;
        decode_location_point(&bytes)
    }

    async fn resolve_forecast(self, grid: GridLocation) -> Result<CityForecast, FetchError> {
        let url = self.urls.forecast_url(&grid)?;
        let bytes = self.fetch_gated(&url).await?;
        decode_city_forecast(&bytes)
    }

    // The permit covers the network call only, not decoding.
    async fn fetch_gated(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let _permit = self.gate.admit().await?;
        self.fetcher.fetch(url).await
    }
}

/// Builds the full forecast dataset for a city registry
pub struct ForecastAggregator {
    registry: Arc<CityRegistry>,
    task: CityTask,
}

impl ForecastAggregator {
    /// `width` is the admission gate width; 1 serializes every request.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        urls: RequestUrlBuilder,
        registry: CityRegistry,
        width: usize,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            task: CityTask {
                fetcher,
                urls: Arc::new(urls),
                gate: Arc::new(AdmissionGate::new(width)),
            },
        }
    }

    #[must_use]
    pub fn registry(&self) -> &CityRegistry {
        &self.registry
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.task.gate
    }

    /// Run both phases and return whatever subset of cities resolved
    pub async fn aggregate(&self) -> ForecastDataset {
        self.aggregate_with_report().await.dataset
    }

    /// Run both phases, additionally reporting every dropped city
    #[instrument(
        name = "aggregate_forecast",
        skip(self),
        fields(cities = self.registry.len(), width = self.task.gate.width())
    )]
    pub async fn aggregate_with_report(&self) -> AggregationReport {
        let start_time = Instant::now();
        let mut failures = Vec::new();

        // Phase 1: coordinates -> grid location
        let point_tasks = self.registry.cities().iter().map(|city| {
            let task = self.task.clone();
            let coordinates = city.coordinates;
            (city.name.clone(), tokio::spawn(task.resolve_point(coordinates)))
        });
        let points = settle(point_tasks).await;

        // Later registry entries overwrite earlier ones with the same name.
        let mut point_map: HashMap<String, LocationPointInfo> = HashMap::new();
        for (city, outcome) in points {
            match outcome {
                Ok(info) => {
                    debug!(
                        "Resolved {} to grid {}/{},{} ({}, {})",
                        city, info.grid.grid_id, info.grid.grid_x, info.grid.grid_y, info.city, info.state
                    );
                    point_map.insert(city, info);
                }
                Err(e) => failures.push(record_failure(city, Phase::PointLookup, &e)),
            }
        }
        info!(
            "Point lookup finished: {}/{} cities resolved",
            point_map.len(),
            self.registry.len()
        );

        // Phase 2: grid location -> forecast document
        let forecast_tasks: Vec<_> = point_map
            .into_iter()
            .map(|(city, info)| {
                let task = self.task.clone();
                let handle = tokio::spawn(task.resolve_forecast(info.grid));
                ((city, info.state), handle)
            })
            .collect();
        let forecasts = settle(forecast_tasks).await;

        let mut dataset = ForecastDataset::new();
        for ((city, state), outcome) in forecasts {
            match outcome {
                Ok(mut forecast) => {
                    forecast.city.clone_from(&city);
                    forecast.state = Some(state);
                    dataset.insert(city, forecast);
                }
                Err(e) => failures.push(record_failure(city, Phase::Forecast, &e)),
            }
        }

        info!(
            "Aggregated forecasts for {}/{} cities in {:.3}s",
            dataset.len(),
            self.registry.len(),
            start_time.elapsed().as_secs_f64()
        );

        AggregationReport { dataset, failures }
    }

    /// Spawn an aggregation and deliver its dataset exactly once on `ctx`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn request(
        self: &Arc<Self>,
        ctx: &CompletionContext,
        completion: impl FnOnce(ForecastDataset) + Send + 'static,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let dataset = aggregator.aggregate().await;
            ctx.post(move || completion(dataset));
        })
    }
}

/// Barrier: wait for every task of a round, keeping each task's key.
/// A panicked task counts as an internal failure of that key.
async fn settle<K, T, I>(tasks: I) -> Vec<(K, Result<T, FetchError>)>
where
    I: IntoIterator<Item = (K, JoinHandle<Result<T, FetchError>>)>,
{
    let waits = tasks.into_iter().map(|(key, handle)| joined(key, handle));
    join_all(waits).await
}

fn joined<K, T>(
    key: K,
    handle: JoinHandle<Result<T, FetchError>>,
) -> impl Future<Output = (K, Result<T, FetchError>)> {
    async move {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("City task did not complete: {}", e);
                Err(FetchError::internal(e.to_string()))
            }
        };
        (key, outcome)
    }
}

fn record_failure(city: String, phase: Phase, e: &FetchError) -> CityFailure {
    warn!("Dropping {} after {:?} failure ({:?}): {}", city, phase, e.kind(), e);
    CityFailure {
        city,
        phase,
        kind: e.kind(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::completion_context;
    use crate::registry::City;
    use crate::testing::{
        BASE, Scripted, ScriptedFetcher, forecast_body, forecast_url, point_body, point_url,
    };
    use rstest::rstest;
    use std::time::Duration;

    fn aggregator(fetcher: Arc<ScriptedFetcher>, registry: CityRegistry, width: usize) -> ForecastAggregator {
        ForecastAggregator::new(
            fetcher,
            RequestUrlBuilder::new(BASE).unwrap(),
            registry,
            width,
        )
    }

    /// City `i` sits at (i, -i) on grid `G{i}` i,i
    fn scripted_cities(count: usize) -> (CityRegistry, ScriptedFetcher) {
        let mut cities = Vec::new();
        let mut fetcher = ScriptedFetcher::new();
        for i in 1..=count {
            let (lat, lon) = (i as f64, -(i as f64));
            let grid = format!("G{i}");
            let name = format!("City {i}");
            cities.push(City::new(name.clone(), lat, lon));
            fetcher = fetcher
                .respond(
                    point_url(lat, lon),
                    Scripted::Body(point_body(&grid, i as i64, i as i64, &name, "ST")),
                )
                .respond(
                    forecast_url(&grid, i as i64, i as i64),
                    Scripted::Body(forecast_body(&[70 + i as i32, 50 + i as i32])),
                );
        }
        (CityRegistry::new(cities), fetcher)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_point_failure_drops_city() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .respond(point_url(1.0, 1.0), Scripted::Body(point_body("AAA", 1, 1, "Aville", "AA")))
                .respond(forecast_url("AAA", 1, 1), Scripted::Body(forecast_body(&[80, 60])))
                .respond(point_url(2.0, 2.0), Scripted::Transport),
        );
        let registry = CityRegistry::new(vec![City::new("A", 1.0, 1.0), City::new("B", 2.0, 2.0)]);

        let report = aggregator(Arc::clone(&fetcher), registry, 1)
            .aggregate_with_report()
            .await;

        assert_eq!(report.dataset.len(), 1);
        let a = &report.dataset["A"];
        assert_eq!(a.city, "A");
        assert_eq!(a.state.as_deref(), Some("AA"));
        assert_eq!(a.periods.len(), 2);
        assert_eq!(a.periods[0].temperature, 80);
        assert!(!report.dataset.contains_key("B"));

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].city, "B");
        assert_eq!(report.failures[0].phase, Phase::PointLookup);
        assert_eq!(report.failures[0].kind, ErrorKind::Transport);

        // B never reached phase 2
        assert_eq!(fetcher.total_calls(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_point_status_500_is_recorded() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().respond(point_url(5.0, 5.0), Scripted::Status(500)),
        );
        let registry = CityRegistry::new(vec![City::new("E", 5.0, 5.0)]);

        let report = aggregator(Arc::clone(&fetcher), registry, 1)
            .aggregate_with_report()
            .await;

        assert!(report.dataset.is_empty());
        assert_eq!(report.failures[0].kind, ErrorKind::RequestFailed(500));
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_forecast_failure_drops_city_after_point_success() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .respond(point_url(1.0, 1.0), Scripted::Body(point_body("AAA", 1, 1, "Aville", "AA")))
                .respond(forecast_url("AAA", 1, 1), Scripted::Body(b"{\"properties\":{}}".to_vec())),
        );
        let registry = CityRegistry::new(vec![City::new("A", 1.0, 1.0)]);

        let report = aggregator(Arc::clone(&fetcher), registry, 1)
            .aggregate_with_report()
            .await;

        assert!(report.dataset.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, Phase::Forecast);
        assert_eq!(report.failures[0].kind, ErrorKind::Decoding);
        assert_eq!(fetcher.calls_to(&forecast_url("AAA", 1, 1)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invalid_coordinates_never_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let registry = CityRegistry::new(vec![City::new("Nowhere", f64::NAN, 0.0)]);

        let report = aggregator(Arc::clone(&fetcher), registry, 1)
            .aggregate_with_report()
            .await;

        assert!(report.dataset.is_empty());
        assert_eq!(report.failures[0].kind, ErrorKind::InvalidUrl);
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let report = aggregator(Arc::clone(&fetcher), CityRegistry::default(), 1)
            .aggregate_with_report()
            .await;

        assert!(report.dataset.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_cities_resolve_and_keys_come_from_registry() {
        let (registry, fetcher) = scripted_cities(5);
        let names: Vec<String> = registry.cities().iter().map(|c| c.name.clone()).collect();
        let fetcher = Arc::new(fetcher);

        let dataset = aggregator(Arc::clone(&fetcher), registry, 2).aggregate().await;

        assert_eq!(dataset.len(), 5);
        for (key, forecast) in &dataset {
            assert!(names.contains(key));
            assert_eq!(&forecast.city, key);
            assert_eq!(forecast.state.as_deref(), Some("ST"));
        }
        assert_eq!(dataset["City 3"].periods[0].temperature, 73);
        assert_eq!(fetcher.total_calls(), 10);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_bounded_by_width(#[case] width: usize) {
        let (registry, fetcher) = scripted_cities(6);
        let fetcher = Arc::new(fetcher.with_delay(Duration::from_millis(20)));
        let aggregator = aggregator(Arc::clone(&fetcher), registry, width);

        let dataset = aggregator.aggregate().await;

        assert_eq!(dataset.len(), 6);
        let gate = aggregator.gate();
        assert_eq!(gate.width(), width);
        assert_eq!(gate.admitted(), 12);
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.peak_in_flight() >= 1);
        assert!(gate.peak_in_flight() <= width);
        assert!(fetcher.peak_in_flight() <= width);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_forecasts_wait_for_every_point_lookup() {
        let (registry, fetcher) = scripted_cities(6);
        // Uneven point latencies so early finishers could race ahead
        let fetcher = [40, 5, 25, 10, 60, 15]
            .into_iter()
            .enumerate()
            .fold(fetcher.with_delay(Duration::from_millis(5)), |f, (i, ms)| {
                let n = (i + 1) as f64;
                f.delay_for(point_url(n, -n), Duration::from_millis(ms))
            });
        let fetcher = Arc::new(fetcher);

        let dataset = aggregator(Arc::clone(&fetcher), registry, 3).aggregate().await;
        assert_eq!(dataset.len(), 6);

        let spans = fetcher.spans();
        let (points, forecasts): (Vec<_>, Vec<_>) =
            spans.iter().partition(|s| s.url.contains("/points/"));
        assert_eq!(points.len(), 6);
        assert_eq!(forecasts.len(), 6);

        let last_point_end = points.iter().map(|s| s.finished).max().unwrap();
        let first_forecast_start = forecasts.iter().map(|s| s.started).min().unwrap();
        assert!(last_point_end < first_forecast_start);
        // Width 3 really overlapped the point lookups
        assert!(fetcher.peak_in_flight() > 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_city_names_collapse_to_one_entry() {
        // Latent hazard: names key the dataset, so duplicates overwrite.
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .respond(point_url(1.0, 1.0), Scripted::Body(point_body("AAA", 1, 1, "First", "AA")))
                .respond(point_url(2.0, 2.0), Scripted::Body(point_body("BBB", 2, 2, "Second", "BB")))
                .respond(forecast_url("AAA", 1, 1), Scripted::Body(forecast_body(&[10])))
                .respond(forecast_url("BBB", 2, 2), Scripted::Body(forecast_body(&[20]))),
        );
        let registry = CityRegistry::new(vec![
            City::new("Springfield", 1.0, 1.0),
            City::new("Springfield", 2.0, 2.0),
        ]);

        let dataset = aggregator(Arc::clone(&fetcher), registry, 2).aggregate().await;

        assert_eq!(dataset.len(), 1);
        let forecast = &dataset["Springfield"];
        assert_eq!(forecast.state.as_deref(), Some("BB"));
        assert_eq!(forecast.periods[0].temperature, 20);
        assert_eq!(fetcher.calls_to(&forecast_url("AAA", 1, 1)), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_delivers_once_on_context() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let aggregator = Arc::new(aggregator(fetcher, CityRegistry::default(), 1));
        let (ctx, queue) = completion_context();
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&delivered);
        aggregator
            .request(&ctx, move |dataset| {
                assert!(dataset.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        drop(ctx);

        queue.run().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_width_zero_is_one() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.width(), 1);
        let permit = gate.admit().await.unwrap();
        assert_eq!(gate.in_flight(), 1);
        drop(permit);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.peak_in_flight(), 1);
    }
}
