use super::errors::ApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type HttpResult<T> = Result<T, ApiError>;

pub const NO_DATA_DETAIL: &str = "No data found for the given country";
pub const INTERNAL_ERROR_DETAIL: &str = "Internal Server Error";

/// Error body returned to callers. Internal failures carry only an opaque message; their
/// cause is logged.
#[derive(Debug, Clone, PartialEq, Eq, ToSchema, Serialize, Deserialize)]
#[schema(example = json!({"detail": "No data found for the given country"}))]
pub struct ErrorDetail {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        HttpError::from_error(self).into_response()
    }
}

#[derive(Debug, Clone)]
pub enum HttpError {
    NotFound { message: String },
    Internal,
}

impl HttpError {
    fn from_error(error: ApiError) -> Self {
        match error {
            ApiError::NoData(country) => {
                tracing::info!(%country, "no weather observations found for country");
                Self::NotFound { message: NO_DATA_DETAIL.to_string() }
            },

            // explicit list so new ApiError variants get a deliberate mapping
            error @ (ApiError::Store(_)
            | ApiError::RateLimit
            | ApiError::IO(_)
            | ApiError::HttpEngine(_)
            | ApiError::Join(_)) => {
                tracing::error!(?error, "HTTP handler error: {error}");
                Self::Internal
            },
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound { message } => {
                (StatusCode::NOT_FOUND, Json(ErrorDetail { detail: message })).into_response()
            },
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorDetail { detail: INTERNAL_ERROR_DETAIL.to_string() }),
            )
                .into_response(),
        }
    }
}
