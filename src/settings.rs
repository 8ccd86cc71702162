mod cli_options;

pub use cli_options::{CliOptions, Role};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use secrecy::Secret;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const APP_ENV_PREFIX: &str = "APP";
pub const APP_ENV_SEPARATOR: &str = "__";

/// Environment variables understood by earlier deployments of the pipeline, mapped onto
/// their settings keys. They take precedence over every other source.
const LEGACY_ENVIRONMENT: [(&str, &str); 6] = [
    ("WEATHER_API_KEY", "weather_api.api_key"),
    ("AWS_REGION_NAME", "queue.region"),
    ("AWS_ACCOUNT_ID", "queue.account_id"),
    ("DATABASE_URL", "store.url"),
    ("PROBE_INTERVAL_SECONDS", "scheduler.probe_interval"),
    ("CITIES_PATH", "scheduler.cities_path"),
];

/// Account id local SQS emulators accept when none is configured.
const EMULATOR_ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Config(#[from] ConfigError),

    #[error("required setting is not configured: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub http_api: HttpApiSettings,

    #[serde(default)]
    pub weather_api: WeatherApiSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub processor: ProcessorSettings,
}

impl Settings {
    /// Layers, lowest precedence first: defaults, `--config` file, the `--env` resource file,
    /// `--secrets` file, `APP__` environment variables and finally the legacy variables.
    #[tracing::instrument(level = "debug")]
    pub fn load(options: &CliOptions) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        if let Some(ref config) = options.config {
            builder = builder.add_source(File::from(config.as_path()));
        }

        if let Some(ref environment) = options.environment {
            let environment_path = options.resources.join(environment);
            builder = builder.add_source(
                File::with_name(&environment_path.to_string_lossy()).required(false),
            );
        }

        if let Some(ref secrets) = options.secrets {
            builder = builder.add_source(File::from(secrets.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix(APP_ENV_PREFIX)
                .prefix_separator(APP_ENV_SEPARATOR)
                .separator(APP_ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings = Self::with_legacy_environment(builder)?.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn with_legacy_environment(
        mut builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        for (var, key) in LEGACY_ENVIRONMENT {
            if let Ok(value) = std::env::var(var) {
                tracing::debug!(%key, "overriding setting from {var}");
                builder = builder.set_override(key, value)?;
            }
        }

        Ok(builder)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpApiSettings {
    #[serde(default = "HttpApiSettings::default_host")]
    pub host: String,

    #[serde(default = "HttpApiSettings::default_port")]
    pub port: u16,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "HttpApiSettings::default_timeout")]
    pub timeout: Duration,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl Default for HttpApiSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            timeout: Self::default_timeout(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl HttpApiSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    const fn default_port() -> u16 {
        8000
    }

    const fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "RateLimitSettings::default_burst_size")]
    pub burst_size: u32,

    /// Replenish period of one request slot per client address.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "RateLimitSettings::default_per_duration")]
    pub per_duration: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            burst_size: Self::default_burst_size(),
            per_duration: Self::default_per_duration(),
        }
    }
}

impl RateLimitSettings {
    const fn default_burst_size() -> u32 {
        8
    }

    const fn default_per_duration() -> Duration {
        Duration::from_millis(500)
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherApiSettings {
    #[serde(default = "WeatherApiSettings::default_base_url")]
    pub base_url: Url,

    #[serde(default)]
    pub api_key: Option<Secret<String>>,

    /// Whole-request timeout of the HTTP client; the only bound on a hung fetch.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "WeatherApiSettings::default_timeout")]
    pub timeout: Duration,
}

impl Default for WeatherApiSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            timeout: Self::default_timeout(),
        }
    }
}

impl WeatherApiSettings {
    fn default_base_url() -> Url {
        Url::parse("http://api.weatherapi.com/v1/").expect("valid default weather api url")
    }

    const fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn require_api_key(&self) -> Result<&Secret<String>, SettingsError> {
        self.api_key.as_ref().ok_or(SettingsError::Missing("weather_api.api_key"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default = "QueueSettings::default_queue_name")]
    pub queue_name: String,

    /// Explicit queue url; otherwise derived from the endpoint url when set, else from
    /// region, account and queue name.
    #[serde(default)]
    pub queue_url: Option<String>,

    /// Alternate SQS endpoint, e.g., a local emulator.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            region: None,
            account_id: None,
            queue_name: Self::default_queue_name(),
            queue_url: None,
            endpoint_url: None,
        }
    }
}

impl QueueSettings {
    fn default_queue_name() -> String {
        "exercise-exodus".to_string()
    }

    pub fn queue_url(&self) -> Result<String, SettingsError> {
        if let Some(ref queue_url) = self.queue_url {
            return Ok(queue_url.clone());
        }

        if let Some(ref endpoint_url) = self.endpoint_url {
            let account_id = self.account_id.as_deref().unwrap_or(EMULATOR_ACCOUNT_ID);
            return Ok(format!(
                "{}/{account_id}/{}",
                endpoint_url.trim_end_matches('/'),
                self.queue_name
            ));
        }

        let region = self.region.as_deref().ok_or(SettingsError::Missing("queue.region"))?;
        let account_id =
            self.account_id.as_deref().ok_or(SettingsError::Missing("queue.account_id"))?;
        Ok(format!(
            "https://sqs.{region}.amazonaws.com/{account_id}/{}",
            self.queue_name
        ))
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub url: Option<Secret<String>>,

    #[serde(default = "StoreSettings::default_max_connections")]
    pub max_connections: u32,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "StoreSettings::default_acquire_timeout")]
    pub acquire_timeout: Duration,

    #[serde(default = "StoreSettings::default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "StoreSettings::default_connect_retry_delay")]
    pub connect_retry_delay: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: Self::default_max_connections(),
            acquire_timeout: Self::default_acquire_timeout(),
            connect_attempts: Self::default_connect_attempts(),
            connect_retry_delay: Self::default_connect_retry_delay(),
        }
    }
}

impl StoreSettings {
    const fn default_max_connections() -> u32 {
        5
    }

    const fn default_acquire_timeout() -> Duration {
        Duration::from_secs(5)
    }

    const fn default_connect_attempts() -> u32 {
        5
    }

    const fn default_connect_retry_delay() -> Duration {
        Duration::from_millis(1_000)
    }

    pub fn require_url(&self) -> Result<&Secret<String>, SettingsError> {
        self.url.as_ref().ok_or(SettingsError::Missing("store.url"))
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "SchedulerSettings::default_probe_interval")]
    pub probe_interval: Duration,

    #[serde(default = "SchedulerSettings::default_cities_path")]
    pub cities_path: PathBuf,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            probe_interval: Self::default_probe_interval(),
            cities_path: Self::default_cities_path(),
        }
    }
}

impl SchedulerSettings {
    const fn default_probe_interval() -> Duration {
        Duration::from_secs(60)
    }

    fn default_cities_path() -> PathBuf {
        PathBuf::from("resources/list_of_cities.txt")
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessorSettings {
    #[serde(default = "ProcessorSettings::default_max_messages")]
    pub max_messages: i32,

    /// Lease on received messages. Must comfortably exceed the time to store a full batch, or
    /// messages reappear while still being processed.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "ProcessorSettings::default_visibility_timeout")]
    pub visibility_timeout: Duration,

    /// Long-poll wait on receive; zero polls without waiting.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default)]
    pub wait_time: Duration,

    /// Pause after an empty or failed poll.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "ProcessorSettings::default_idle_backoff")]
    pub idle_backoff: Duration,

    /// Malformed messages received more often than this are discarded. Unset keeps them in
    /// the queue indefinitely.
    #[serde(default)]
    pub max_receive_count: Option<u32>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_messages: Self::default_max_messages(),
            visibility_timeout: Self::default_visibility_timeout(),
            wait_time: Duration::ZERO,
            idle_backoff: Self::default_idle_backoff(),
            max_receive_count: None,
        }
    }
}

impl ProcessorSettings {
    const fn default_max_messages() -> i32 {
        10
    }

    const fn default_visibility_timeout() -> Duration {
        Duration::from_secs(60)
    }

    const fn default_idle_backoff() -> Duration {
        Duration::from_millis(500)
    }
}
