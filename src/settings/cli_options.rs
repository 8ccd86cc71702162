use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Weather observation ingest pipeline")]
pub struct CliOptions {
    /// Override the default configuration with an explicit settings file.
    #[arg(short, long, value_name = "PATH_TO_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Specify the path to the secrets settings file, e.g., holding the weather api key.
    #[arg(short, long, value_name = "PATH_TO_SECRETS_FILE")]
    pub secrets: Option<PathBuf>,

    /// Name of the environment resource file layered over the defaults.
    #[arg(short = 'e', long = "env", env = "APP_ENVIRONMENT")]
    pub environment: Option<String>,

    #[arg(long, value_name = "DIRECTORY", default_value = "resources")]
    pub resources: PathBuf,

    #[command(subcommand)]
    pub role: Role,
}

impl CliOptions {
    pub const fn env_app_environment() -> &'static str {
        "APP_ENVIRONMENT"
    }
}

/// The pipeline stage this process runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Subcommand)]
pub enum Role {
    /// Fetch current weather for every configured city and publish it to the queue.
    Scheduler,

    /// Drain queued weather reports into the observation store.
    Processor,

    /// Serve per-country aggregates over HTTP.
    Api,
}

impl Role {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Processor => "processor",
            Self::Api => "api",
        }
    }
}
