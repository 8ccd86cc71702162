use crate::model::CityList;
use crate::services::{CurrentWeatherApi, QueueError, WeatherApiError, WeatherQueue};
use futures::future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{0}")]
    Fetch(#[from] WeatherApiError),

    #[error("failed to serialize weather report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish weather report: {0}")]
    Publish(#[from] QueueError),
}

/// Outcome counts of one tick across all configured cities.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub published: usize,
    pub failed: usize,
}

/// Periodically collects current weather for every configured city and publishes each raw
/// report onto the weather queue.
pub struct Scheduler {
    weather_api: Arc<dyn CurrentWeatherApi>,
    queue: Arc<dyn WeatherQueue>,
    cities: CityList,
    probe_interval: Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cities", &self.cities)
            .field("probe_interval", &self.probe_interval)
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        weather_api: Arc<dyn CurrentWeatherApi>, queue: Arc<dyn WeatherQueue>, cities: CityList,
        probe_interval: Duration,
    ) -> Self {
        Self { weather_api, queue, cities, probe_interval }
    }

    pub const fn cities(&self) -> &CityList {
        &self.cities
    }

    /// Runs ticks forever. A tick starts only after every city task of the previous tick has
    /// settled and the probe interval has elapsed.
    pub async fn run(&self) {
        loop {
            let summary = self.run_tick().await;
            tracing::info!(
                published=%summary.published, failed=%summary.failed,
                "sleeping for {} seconds...", self.probe_interval.as_secs()
            );
            tokio::time::sleep(self.probe_interval).await;
        }
    }

    /// Fetches and publishes every city concurrently, returning once all of them have
    /// finished. A failing city never affects the others.
    #[tracing::instrument(level = "debug", skip(self), fields(nr_cities=%self.cities.len()))]
    pub async fn run_tick(&self) -> TickSummary {
        let tasks = self.cities.iter().map(|city| self.collect_city(city));
        let outcomes = future::join_all(tasks).await;

        outcomes.into_iter().fold(TickSummary::default(), |mut summary, outcome| {
            match outcome {
                Ok(_) => summary.published += 1,
                Err(_) => summary.failed += 1,
            }
            summary
        })
    }

    async fn collect_city(&self, city: &str) -> Result<String, CollectError> {
        let outcome = self.fetch_and_publish(city).await;
        match &outcome {
            Ok(message_id) => {
                tracing::info!(%city, %message_id, "sent weather data for {city} to queue");
            },
            Err(error) => {
                tracing::warn!(%city, ?error, "can't get data for {city}: {error}");
            },
        }
        outcome
    }

    async fn fetch_and_publish(&self, city: &str) -> Result<String, CollectError> {
        let report = self.weather_api.current_weather(city).await?;
        let body = serde_json::to_string(&report)?;
        let message_id = self.queue.send(city, body).await?;
        Ok(message_id)
    }
}
