use crate::model::{CityAggregate, WeatherObservation};
use crate::settings::{SettingsError, StoreSettings};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const CREATE_OBSERVATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS weather_observations (
    id BIGSERIAL PRIMARY KEY,
    "localtime" TEXT NOT NULL,
    city TEXT NOT NULL,
    country TEXT NOT NULL,
    temp_c DOUBLE PRECISION NOT NULL,
    "condition" TEXT NOT NULL
)"#;

const CREATE_COUNTRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS weather_observations_country_idx ON weather_observations (country)";

const INSERT_OBSERVATION: &str = r#"
INSERT INTO weather_observations ("localtime", city, country, temp_c, "condition")
VALUES ($1, $2, $3, $4, $5)"#;

// latest condition is the row with the highest insertion sequence per city
const AGGREGATE_BY_COUNTRY: &str = r#"
SELECT city,
       AVG(temp_c) AS average_temp_c,
       (ARRAY_AGG("condition" ORDER BY id DESC))[1] AS lastest_condition_text
FROM weather_observations
WHERE country = $1
GROUP BY city
ORDER BY city"#;

// SQLSTATE undefined_table
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed database operation: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("failed to connect to observation store after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    #[error("observation store is unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Settings(#[from] SettingsError),
}

/// Append-only storage of weather observations with per-country aggregation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Liveness probe against the backing store.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Creates observation storage and the secondary index on country that backs
    /// [`ObservationStore::aggregate_by_country`]. Idempotent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    async fn insert_observation(&self, observation: &WeatherObservation) -> Result<(), StoreError>;

    /// One aggregate per city observed in `country`; empty when nothing matches, including
    /// before any observation storage exists.
    async fn aggregate_by_country(&self, country: &str) -> Result<Vec<CityAggregate>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pool that opens connections on first use; used by the query api, which should start
    /// even while the database is still coming up.
    pub fn connect_lazy(settings: &StoreSettings) -> Result<Self, StoreError> {
        let options = connect_options(settings)?;
        let pool = pool_options(settings).connect_lazy_with(options);
        Ok(Self::new(pool))
    }

    /// Single eager connection attempt.
    #[tracing::instrument(level = "debug", skip(settings))]
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let options = connect_options(settings)?;
        let pool = pool_options(settings).connect_with(options).await?;
        Ok(Self::new(pool))
    }
}

fn connect_options(settings: &StoreSettings) -> Result<PgConnectOptions, StoreError> {
    let url = settings.require_url()?;
    Ok(PgConnectOptions::from_str(url.expose_secret())?)
}

fn pool_options(settings: &StoreSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
}

#[async_trait]
impl ObservationStore for PostgresStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_OBSERVATIONS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_COUNTRY_INDEX).execute(&self.pool).await?;
        tracing::info!("ensured weather observations table and country index");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn insert_observation(&self, observation: &WeatherObservation) -> Result<(), StoreError> {
        sqlx::query(INSERT_OBSERVATION)
            .bind(&observation.localtime)
            .bind(&observation.city)
            .bind(&observation.country)
            .bind(observation.temp_c)
            .bind(&observation.condition)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn aggregate_by_country(&self, country: &str) -> Result<Vec<CityAggregate>, StoreError> {
        let outcome = sqlx::query_as::<_, CityAggregate>(AGGREGATE_BY_COUNTRY)
            .bind(country)
            .fetch_all(&self.pool)
            .await;

        match outcome {
            Ok(aggregates) => Ok(aggregates),
            Err(error) if is_undefined_table(&error) => {
                tracing::warn!(?error, "no weather observations stored yet");
                Ok(Vec::new())
            },
            Err(error) => Err(error.into()),
        }
    }
}

fn is_undefined_table(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.code().as_deref() == Some(UNDEFINED_TABLE),
        _ => false,
    }
}

/// Establishes a store through `connect`, probing each new connection for liveness. Makes at
/// most `max_attempts` attempts, pausing `retry_delay` between them; exhausting them is fatal.
#[tracing::instrument(level = "debug", skip(connect))]
pub async fn connect_with_retry<S, F, Fut>(
    max_attempts: u32, retry_delay: Duration, mut connect: F,
) -> Result<S, StoreError>
where
    S: ObservationStore,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, StoreError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let outcome = match connect().await {
            Ok(store) => store.ping().await.map(|()| store),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(store) => {
                tracing::info!(%attempt, "connected to observation store");
                return Ok(store);
            },

            Err(error) => {
                tracing::warn!(
                    ?error,
                    "observation store connection failed. Retrying ... (Attempt {attempt}/{max_attempts})"
                );
                last_error = Some(error);
            },
        }

        if attempt < max_attempts && !retry_delay.is_zero() {
            tokio::time::sleep(retry_delay).await;
        }
    }

    let last_error = last_error.map(|err| err.to_string()).unwrap_or_default();
    tracing::error!(%max_attempts, %last_error, "exhausted observation store connection attempts");
    Err(StoreError::ConnectionExhausted { attempts: max_attempts, last_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemoryStore;
    use claims::{assert_err, assert_ok};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_connect_exhausts_after_configured_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let outcome = connect_with_retry(5, Duration::ZERO, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<InMemoryStore, _>(StoreError::Unavailable("connection refused".into())) }
        })
        .await;

        let error = assert_err!(outcome);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert!(matches!(error, StoreError::ConnectionExhausted { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_connect_retries_failed_liveness_probe() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let outcome = connect_with_retry(5, Duration::ZERO, || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                let store = InMemoryStore::default();
                store.set_available(attempt >= 3);
                Ok(store)
            }
        })
        .await;

        assert_ok!(outcome);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_probes_each_new_connection() {
        let outcome = connect_with_retry(1, Duration::ZERO, || async {
            let mut store = MockObservationStore::new();
            store.expect_ping().times(1).returning(|| Ok(()));
            Ok(store)
        })
        .await;

        assert_ok!(outcome);
    }

    #[test]
    fn test_only_undefined_table_reads_as_empty() {
        assert!(!is_undefined_table(&sqlx::Error::RowNotFound));
        assert!(!is_undefined_table(&sqlx::Error::PoolTimedOut));
    }

    const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

    /// Store confined to a fresh schema of the database at `TEST_DATABASE_URL`.
    async fn postgres_store(tag: &str) -> (PostgresStore, String) {
        let url = std::env::var(TEST_DATABASE_URL)
            .unwrap_or_else(|_| panic!("{TEST_DATABASE_URL} must point at a Postgres database"));
        let options = assert_ok!(PgConnectOptions::from_str(&url));
        // single connection so the search path below applies to every query
        let pool = assert_ok!(PgPoolOptions::new().max_connections(1).connect_with(options).await);

        let since_epoch =
            assert_ok!(std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH));
        let schema = format!("weather_{tag}_{}_{}", std::process::id(), since_epoch.as_nanos());
        assert_ok!(sqlx::query(&format!("CREATE SCHEMA {schema}")).execute(&pool).await);
        assert_ok!(sqlx::query(&format!("SET search_path TO {schema}")).execute(&pool).await);

        (PostgresStore::new(pool), schema)
    }

    async fn drop_schema(store: &PostgresStore, schema: &str) {
        let drop = format!("DROP SCHEMA {schema} CASCADE");
        assert_ok!(sqlx::query(&drop).execute(&store.pool).await);
    }

    fn observation(city: &str, country: &str, temp_c: f64, condition: &str) -> WeatherObservation {
        WeatherObservation {
            localtime: "2024-08-21 14:05".to_string(),
            city: city.to_string(),
            country: country.to_string(),
            temp_c,
            condition: condition.to_string(),
        }
    }

    #[tokio::test]
    #[ignore = "requires a Postgres database at TEST_DATABASE_URL"]
    async fn test_postgres_query_before_any_observation_is_not_found() {
        use crate::server::{router, AppState};
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let (store, schema) = postgres_store("no_table").await;
        let actual = assert_ok!(store.aggregate_by_country("Israel").await);
        assert!(actual.is_empty());

        let app = router(AppState::new(Arc::new(store.clone())));
        let request = assert_ok!(Request::builder().uri("/exercise/Israel").body(Body::empty()));
        let response = assert_ok!(app.oneshot(request).await);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = assert_ok!(hyper::body::to_bytes(response.into_body()).await);
        assert_eq!(
            assert_ok!(serde_json::from_slice::<serde_json::Value>(&bytes)),
            serde_json::json!({"detail": "No data found for the given country"})
        );

        drop_schema(&store, &schema).await;
    }

    #[tokio::test]
    #[ignore = "requires a Postgres database at TEST_DATABASE_URL"]
    async fn test_postgres_aggregate_takes_latest_inserted_condition() {
        let (store, schema) = postgres_store("aggregate").await;
        assert_ok!(store.ensure_schema().await);
        assert_ok!(store.ensure_schema().await);

        for observation in [
            observation("A", "X", 20.0, "Clear"),
            observation("B", "X", 7.0, "Snow"),
            observation("A", "X", 30.0, "Rain"),
            observation("C", "Y", 15.0, "Cloudy"),
        ] {
            assert_ok!(store.insert_observation(&observation).await);
        }

        let actual = assert_ok!(store.aggregate_by_country("X").await);
        assert_eq!(
            actual,
            vec![
                CityAggregate {
                    city: "A".to_string(),
                    average_temp_c: 25.0,
                    latest_condition_text: "Rain".to_string(),
                },
                CityAggregate {
                    city: "B".to_string(),
                    average_temp_c: 7.0,
                    latest_condition_text: "Snow".to_string(),
                },
            ]
        );
        assert!(assert_ok!(store.aggregate_by_country("Atlantis").await).is_empty());

        drop_schema(&store, &schema).await;
    }
}
