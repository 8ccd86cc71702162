use crate::errors::WeatherError;
use crate::settings::WeatherApiSettings;
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use std::time;
use thiserror::Error;
use url::Url;

const CURRENT_WEATHER_RESOURCE: &str = "current.json";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CurrentWeatherApi: Send + Sync {
    /// Fetches the current conditions for a `"City, Country"` query, returning the response
    /// body untouched.
    async fn current_weather(&self, city: &str) -> Result<serde_json::Value, WeatherApiError>;
}

#[derive(Debug, Error)]
pub enum WeatherApiError {
    #[error("supplied Weather API url is not a base url to query: {0}")]
    NotABaseUrl(Url),

    #[error("Weather API call failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Weather API responded to {city} query with {status}")]
    Status { city: String, status: StatusCode },

    #[error("failed to parse Weather API response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client for the weatherapi.com `current.json` resource. Cloning shares the underlying
/// connection pool.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Secret<String>,
}

impl WeatherApiClient {
    pub fn new(
        base_url: impl Into<Url>, api_key: Secret<String>, timeout: time::Duration,
    ) -> Result<Self, WeatherApiError> {
        let base_url = base_url.into();
        if base_url.cannot_be_a_base() {
            return Err(WeatherApiError::NotABaseUrl(base_url));
        }

        let client = reqwest::Client::builder()
            .pool_idle_timeout(time::Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base_url, api_key })
    }

    pub fn from_settings(settings: &WeatherApiSettings) -> Result<Self, WeatherError> {
        let api_key = settings.require_api_key()?.clone();
        let client = Self::new(settings.base_url.clone(), api_key, settings.timeout)?;
        Ok(client)
    }

    fn current_weather_url(&self, city: &str) -> Result<Url, WeatherApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| WeatherApiError::NotABaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(CURRENT_WEATHER_RESOURCE);

        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret())
            .append_pair("q", city);

        Ok(url)
    }
}

#[async_trait]
impl CurrentWeatherApi for WeatherApiClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn current_weather(&self, city: &str) -> Result<serde_json::Value, WeatherApiError> {
        let url = self.current_weather_url(city)?;
        let response = self.client.get(url).send().await?;
        log_response(city, &response);

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherApiError::Status { city: city.to_string(), status });
        }

        let body = response.text().await?;
        tracing::trace!(%body, %city, "current weather response body");
        Ok(serde_json::from_str(&body)?)
    }
}

fn log_response(city: &str, response: &reqwest::Response) {
    const MESSAGE: &str = "response recd from weather api";
    let status = response.status();
    if status.is_success() || status.is_informational() {
        tracing::debug!(%city, ?status, "{MESSAGE}");
    } else {
        tracing::warn!(%city, ?status, "{MESSAGE}");
    }
}
