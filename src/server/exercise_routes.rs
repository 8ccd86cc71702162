use super::errors::ApiError;
use super::result::{ErrorDetail, HttpResult};
use super::state::{AppState, StoreHandle};
use crate::model::CityAggregate;
use axum::extract::{Path, State};
use axum::{routing, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(serve_country_weather),
    components(schemas(CityAggregate, ErrorDetail)),
    tags((name = "exercise", description = "Weather aggregated per city within a country"))
)]
pub struct ExerciseApiDoc;

pub fn api() -> Router<AppState> {
    Router::new().route("/:country", routing::get(serve_country_weather))
}

/// Average temperature and latest condition of every city observed in the country.
#[utoipa::path(
    get,
    path = "/{country}",
    context_path = "/exercise",
    tag = "exercise",
    params(("country" = String, Path, description = "Country name as reported by the weather api")),
    responses(
        (status = 200, description = "Aggregates per city", body = [CityAggregate]),
        (status = 404, description = "No observations for the country", body = ErrorDetail),
        (status = 500, description = "server error", body = ErrorDetail),
    ),
)]
#[axum::debug_handler(state = AppState)]
#[tracing::instrument(level = "debug", skip(store))]
async fn serve_country_weather(
    State(store): State<StoreHandle>, Path(country): Path<String>,
) -> HttpResult<Json<Vec<CityAggregate>>> {
    let aggregates = store.aggregate_by_country(&country).await?;
    if aggregates.is_empty() {
        return Err(ApiError::NoData(country));
    }

    Ok(Json(aggregates))
}
