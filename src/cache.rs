use crate::aggregator::ForecastAggregator;
use crate::config::ForecastConfig;
use crate::delivery::CompletionContext;
use crate::fetcher::HttpFetcher;
use crate::icon::IconImage;
use crate::models::ForecastDataset;
use crate::registry::CityRegistry;
use crate::url_builder::RequestUrlBuilder;
use crate::{Fetch, FetchError, ForecastError};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

type ImageOutcome = Result<IconImage, Arc<FetchError>>;
type PendingImage = Shared<BoxFuture<'static, ImageOutcome>>;

#[derive(Default)]
struct ImageStore {
    ready: HashMap<Url, IconImage>,
    /// One shared fetch per uncached URL; late callers join it
    pending: HashMap<Url, PendingImage>,
}

/// Process-wide store for the forecast dataset, icon images and the
/// display-unit preference.
///
/// The dataset is computed once and never refreshed. Icons are cached per
/// URL for the life of the cache; failed icon fetches are not cached.
pub struct DataCache {
    aggregator: Arc<ForecastAggregator>,
    image_fetcher: Arc<dyn Fetch>,
    forecast: OnceCell<Arc<ForecastDataset>>,
    images: Arc<Mutex<ImageStore>>,
    prefers_celsius: AtomicBool,
}

impl DataCache {
    #[must_use]
    pub fn new(aggregator: ForecastAggregator, image_fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            image_fetcher,
            forecast: OnceCell::new(),
            images: Arc::new(Mutex::new(ImageStore::default())),
            prefers_celsius: AtomicBool::new(false),
        }
    }

    /// Wire up an HTTP-backed cache from configuration
    pub fn from_config(config: &ForecastConfig, registry: CityRegistry) -> Result<Self, ForecastError> {
        config.validate()?;

        let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(&config.api)?);
        let urls = RequestUrlBuilder::new(&config.api.base_url)
            .map_err(|e| ForecastError::config(e.to_string()))?;
        let aggregator =
            ForecastAggregator::new(Arc::clone(&fetcher), urls, registry, config.fetch.concurrency);

        info!(
            "Forecast cache ready ({} cities, concurrency {})",
            aggregator.registry().len(),
            config.fetch.concurrency
        );
        Ok(Self::new(aggregator, fetcher))
    }

    #[must_use]
    pub fn aggregator(&self) -> &ForecastAggregator {
        &self.aggregator
    }

    /// Full forecast; aggregates on first use, cached afterwards.
    /// Concurrent first callers share one aggregation.
    #[instrument(name = "full_forecast", level = "debug", skip(self))]
    pub async fn full_forecast(&self) -> Arc<ForecastDataset> {
        let dataset = self
            .forecast
            .get_or_init(|| async {
                info!("No cached forecast, aggregating");
                Arc::new(self.aggregator.aggregate().await)
            })
            .await;
        Arc::clone(dataset)
    }

    #[must_use]
    pub fn cached_forecast(&self) -> Option<Arc<ForecastDataset>> {
        self.forecast.get().cloned()
    }

    /// Icon for `url`, fetched and decoded at most once per success
    #[instrument(name = "icon_image", level = "debug", skip(self), fields(url = %url))]
    pub async fn image(&self, url: &Url) -> Result<IconImage, Arc<FetchError>> {
        let pending = {
            let mut store = self.images.lock();
            if let Some(icon) = store.ready.get(url) {
                debug!("Icon cache hit");
                return Ok(icon.clone());
            }
            match store.pending.get(url) {
                Some(pending) => {
                    debug!("Joining in-flight icon fetch");
                    pending.clone()
                }
                None => {
                    let pending = load_image(
                        Arc::clone(&self.image_fetcher),
                        Arc::downgrade(&self.images),
                        url.clone(),
                    )
                    .boxed()
                    .shared();
                    store.pending.insert(url.clone(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    #[must_use]
    pub fn cached_image_count(&self) -> usize {
        self.images.lock().ready.len()
    }

    /// Callback form of [`full_forecast`](Self::full_forecast).
    ///
    /// `completion` runs exactly once, on `ctx`. It receives `None` only if
    /// the aggregation itself could not complete.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn request_full_forecast(
        self: &Arc<Self>,
        ctx: &CompletionContext,
        completion: impl FnOnce(Option<Arc<ForecastDataset>>) + Send + 'static,
    ) {
        if let Some(dataset) = self.cached_forecast() {
            ctx.post(move || completion(Some(dataset)));
            return;
        }

        let cache = Arc::clone(self);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(async move { cache.full_forecast().await }).await;
            let dataset = match outcome {
                Ok(dataset) => Some(dataset),
                Err(e) => {
                    error!("Forecast aggregation did not complete: {}", e);
                    None
                }
            };
            ctx.post(move || completion(dataset));
        });
    }

    /// Callback form of [`image`](Self::image); `None` on any failure.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn request_image(
        self: &Arc<Self>,
        url: Url,
        ctx: &CompletionContext,
        completion: impl FnOnce(Option<IconImage>) + Send + 'static,
    ) {
        let cache = Arc::clone(self);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let icon = cache.image(&url).await.ok();
            ctx.post(move || completion(icon));
        });
    }

    /// Store the display-unit preference. Stored temperatures are untouched.
    pub fn set_unit_preference(&self, prefers_celsius: bool) {
        self.prefers_celsius.store(prefers_celsius, Ordering::SeqCst);
    }

    #[must_use]
    pub fn unit_preference(&self) -> bool {
        self.prefers_celsius.load(Ordering::SeqCst)
    }
}

// Success and pending-removal happen under one lock so no caller can see
// the URL as neither ready nor pending mid-transition.
async fn load_image(fetcher: Arc<dyn Fetch>, store: Weak<Mutex<ImageStore>>, url: Url) -> ImageOutcome {
    let result = match fetcher.fetch(&url).await {
        Ok(bytes) => IconImage::decode(&bytes),
        Err(e) => Err(e),
    };

    let Some(store) = store.upgrade() else {
        return result.map_err(Arc::new);
    };
    let mut store = store.lock();
    store.pending.remove(&url);
    match result {
        Ok(icon) => {
            store.ready.insert(url, icon.clone());
            Ok(icon)
        }
        Err(e) => {
            warn!("Icon fetch for {} failed ({:?}): {}", url, e.kind(), e);
            Err(Arc::new(e))
        }
    }
}
