mod errors;
mod exercise_routes;
mod health_routes;
mod result;
mod state;

pub use errors::ApiError;
pub use result::{ErrorDetail, HttpResult, INTERNAL_ERROR_DETAIL, NO_DATA_DETAIL};
pub use state::{AppState, StoreHandle};

use crate::settings::HttpApiSettings;
use axum::error_handling::HandleErrorLayer;
use axum::http::{Response, StatusCode, Uri};
use axum::{BoxError, Router};
use std::net::{SocketAddr, TcpListener};
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::ServiceBuilderExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::{SwaggerUi, Url as SwaggerUrl};

pub type HttpJoinHandle = JoinHandle<Result<(), ApiError>>;

/// The query api serving per-country weather aggregates.
pub struct Server {
    port: u16,
    server_handle: HttpJoinHandle,
}

impl Server {
    #[tracing::instrument(level = "debug", skip(store))]
    pub async fn build(settings: &HttpApiSettings, store: StoreHandle) -> Result<Self, ApiError> {
        let address = settings.address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!(
            "{:?} API listening on {address}: {listener:?}",
            std::env::current_exe()
        );
        let std_listener = listener.into_std()?;
        let port = std_listener.local_addr()?.port();

        let server_handle = run_http_server(std_listener, AppState::new(store), settings)?;

        Ok(Self { port, server_handle })
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), ApiError> {
        self.server_handle.await?
    }
}

/// Api routes without the serving middleware.
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/health", health_routes::api())
        .nest("/exercise", exercise_routes::api())
        .with_state(state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").urls(vec![
            (
                SwaggerUrl::with_primary("exercise_api", "/api-doc/exercise-openapi.json", true),
                exercise_routes::ExerciseApiDoc::openapi(),
            ),
            (
                SwaggerUrl::new("health_api", "/api-doc/health-openapi.json"),
                health_routes::HealthApiDoc::openapi(),
            ),
        ]))
        .merge(api_routes)
        .fallback(fallback)
}

#[tracing::instrument(level = "trace", skip(state))]
pub fn run_http_server(
    listener: TcpListener, state: AppState, settings: &HttpApiSettings,
) -> Result<HttpJoinHandle, ApiError> {
    let rate_limit = &settings.rate_limit;
    let governor_conf = Box::new(
        GovernorConfigBuilder::default()
            .burst_size(rate_limit.burst_size)
            .period(rate_limit.per_duration)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or(ApiError::RateLimit)?,
    );

    let middleware_stack = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_api_error))
        .layer(GovernorLayer {
            config: Box::leak(governor_conf), // created once per server and lives as long as it
        })
        .timeout(settings.timeout)
        .compression()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .propagate_x_request_id();

    let app = router(state).layer(middleware_stack);

    let handle = tokio::spawn(async move {
        tracing::debug!(app_routes=?app, "starting API server...");
        let builder = axum::Server::from_tcp(listener)?;
        let server = builder.serve(app.into_make_service_with_connect_info::<SocketAddr>());
        let graceful = server.with_graceful_shutdown(shutdown_signal());
        graceful.await?;
        tracing::info!("{:?} API shutting down", std::env::current_exe());
        Ok(())
    });

    Ok(handle)
}

async fn fallback(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No route found for {uri}"))
}

async fn handle_api_error(error: BoxError) -> Response<String> {
    if error.is::<tower::timeout::error::Elapsed>() {
        let response = Response::new(format!("REQUEST TIMEOUT: {error}"));
        let (mut parts, body) = response.into_parts();
        parts.status = StatusCode::REQUEST_TIMEOUT;
        Response::from_parts(parts, body)
    } else if error.is::<tower_governor::errors::GovernorError>() {
        tower_governor::errors::display_error(error)
    } else {
        tracing::error!(%error, "unhandled middleware error");
        let response = Response::new(INTERNAL_ERROR_DETAIL.to_string());
        let (mut parts, body) = response.into_parts();
        parts.status = StatusCode::INTERNAL_SERVER_ERROR;
        Response::from_parts(parts, body)
    }
}

/// Completes on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
