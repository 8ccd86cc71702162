use clap::Parser;
use std::sync::Arc;
use weather_ingest::model::CityList;
use weather_ingest::services::{
    connect_with_retry, ObservationStore, PostgresStore, SqsQueue, WeatherApiClient,
};
use weather_ingest::{CliOptions, Processor, Role, Scheduler, Server, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = parse_options();

    let subscriber = weather_ingest::tracing::get_tracing_subscriber(
        "info",
        format!("weather-{}", options.role.name()),
    );
    weather_ingest::tracing::init_subscriber(subscriber)?;

    let settings = load_settings(&options)?;

    match options.role {
        Role::Scheduler => run_scheduler(&settings).await,
        Role::Processor => run_processor(&settings).await,
        Role::Api => run_api(&settings).await,
    }
}

fn parse_options() -> CliOptions {
    CliOptions::parse()
}

fn load_settings(options: &CliOptions) -> anyhow::Result<Settings> {
    if options.secrets.is_none() {
        tracing::warn!("No secrets configuration provided. Credentials (e.g., the weather api key) should be confined in a secret configuration and sourced in a secure manner.");
    }

    if options.environment.is_none() {
        tracing::info!(
            "No environment configuration override provided via {}.",
            CliOptions::env_app_environment()
        );
    }

    Settings::load(options).map_err(|err| err.into())
}

async fn run_scheduler(settings: &Settings) -> anyhow::Result<()> {
    let cities = CityList::load(&settings.scheduler.cities_path)?;
    let weather_api = WeatherApiClient::from_settings(&settings.weather_api)?;
    let queue = SqsQueue::from_settings(&settings.queue).await?;
    tracing::info!(nr_cities=%cities.len(), queue_url=%queue.queue_url(), "starting scheduler");

    let scheduler = Scheduler::new(
        Arc::new(weather_api),
        Arc::new(queue),
        cities,
        settings.scheduler.probe_interval,
    );

    tokio::select! {
        _ = scheduler.run() => {},
        _ = weather_ingest::server::shutdown_signal() => {},
    }

    Ok(())
}

async fn run_processor(settings: &Settings) -> anyhow::Result<()> {
    let queue = SqsQueue::from_settings(&settings.queue).await?;

    let store = connect_with_retry(
        settings.store.connect_attempts,
        settings.store.connect_retry_delay,
        || PostgresStore::connect(&settings.store),
    )
    .await?;
    store.ensure_schema().await?;
    tracing::info!(queue_url=%queue.queue_url(), "starting processor");

    let processor = Processor::new(Arc::new(queue), Arc::new(store), &settings.processor);

    tokio::select! {
        _ = processor.run() => {},
        _ = weather_ingest::server::shutdown_signal() => {},
    }

    Ok(())
}

async fn run_api(settings: &Settings) -> anyhow::Result<()> {
    let store = PostgresStore::connect_lazy(&settings.store)?;
    if let Err(error) = store.ensure_schema().await {
        tracing::warn!(?error, "observation store not ready; serving before schema is ensured");
    }

    let server = Server::build(&settings.http_api, Arc::new(store)).await?;
    tracing::info!(port=%server.port(), "serving weather query api");
    server.run_until_stopped().await.map_err(|err| err.into())
}
