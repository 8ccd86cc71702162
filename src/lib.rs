#![forbid(unsafe_code)]
#![warn(clippy::cargo, clippy::suspicious, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions)]

mod errors;
pub mod model;
pub mod processor;
pub mod scheduler;
pub mod server;
pub mod services;
pub mod settings;
pub mod tracing;

pub use errors::WeatherError;
pub use processor::Processor;
pub use scheduler::Scheduler;
pub use server::Server;
pub use settings::{CliOptions, Role, Settings};
