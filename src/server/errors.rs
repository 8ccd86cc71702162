use crate::services::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No data found for the given country: {0}")]
    NoData(String),

    #[error("failed observation store operation: {0}")]
    Store(#[from] StoreError),

    #[error("invalid rate limit configuration: burst size and period must be non-zero")]
    RateLimit,

    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("HTTP engine error: {0}")]
    HttpEngine(#[from] hyper::Error),

    #[error("failed joining with thread: {0}")]
    Join(#[from] tokio::task::JoinError),
}
