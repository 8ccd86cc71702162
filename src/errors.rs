use crate::model::CityListError;
use crate::services::{QueueError, StoreError, WeatherApiError};
use crate::settings::SettingsError;
use thiserror::Error;

/// Failures that stop a pipeline process from starting or running.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WeatherError {
    #[error("{0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    CityList(#[from] CityListError),

    #[error("{0}")]
    WeatherApi(#[from] WeatherApiError),

    #[error("{0}")]
    Queue(#[from] QueueError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Api(#[from] crate::server::ApiError),
}
