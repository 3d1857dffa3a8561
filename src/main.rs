use anyhow::{Context, Result, anyhow};
use cityforecast::{CityRegistry, DataCache, ForecastConfig, completion_context, telemetry};
use std::sync::Arc;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let cache = Arc::new(
        DataCache::from_config(&ForecastConfig::default(), CityRegistry::reference())
            .context("Failed to set up forecast cache")?,
    );

    let (ctx, mut queue) = completion_context();
    let (done_tx, done_rx) = oneshot::channel();
    cache.request_full_forecast(&ctx, move |dataset| {
        let _ = done_tx.send(dataset);
    });

    queue.run_next().await;
    let dataset = done_rx
        .await
        .context("Forecast completion was dropped")?
        .ok_or_else(|| anyhow!("Forecast aggregation failed"))?;

    let mut cities: Vec<_> = dataset.values().collect();
    cities.sort_by(|a, b| a.city.cmp(&b.city));

    println!("Forecast for {} cities:", cities.len());
    for forecast in cities {
        let state = forecast.state.as_deref().unwrap_or("?");
        match forecast.current_period() {
            Some(now) => println!(
                "  - {}, {}: {} {}°{} ({} periods)",
                forecast.city,
                state,
                now.short_forecast,
                now.temperature,
                now.temperature_unit.symbol(),
                forecast.periods.len()
            ),
            None => println!("  - {}, {}: no periods", forecast.city, state),
        }
    }

    Ok(())
}
