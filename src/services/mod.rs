pub mod memory;
pub mod queue;
pub mod store;
pub mod weather_api;

pub use queue::{QueueError, QueueMessage, ReceiveParameters, SqsQueue, WeatherQueue};
pub use store::{connect_with_retry, ObservationStore, PostgresStore, StoreError};
pub use weather_api::{CurrentWeatherApi, WeatherApiClient, WeatherApiError};
