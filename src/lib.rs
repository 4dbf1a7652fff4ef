//! cba onboards banking customers: one request creates a user and opens
//! their first account, atomically.

#![forbid(unsafe_code)]
pub mod account;
pub mod config;
pub mod database;
pub mod error;
pub mod notifier;
pub mod onboarding;
mod router;
pub mod telemetry;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
pub use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use crate::account::RandomAccountNumber;
use crate::notifier::{Delivery, LogDelivery, Notifier, WebhookDelivery};
use crate::onboarding::Onboarding;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: axum::http::Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub onboarding: Onboarding,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]));

    let router = Router::new()
        // `POST /createAccount` goes to `create_account`.
        .route("/createAccount", post(router::create_account::handler))
        .with_state(state.clone());

    let router = match state.metrics {
        Some(handle) => router.route("/metrics", get(telemetry::render).with_state(handle)),
        None => router,
    };

    router
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
///
/// Also returns the notification worker, to be awaited on shutdown.
pub async fn initialize_state()
-> Result<(AppState, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
    // read configuration file.  let it in memory.
    let path = std::env::var("CONFIG_PATH").unwrap_or_default();
    let config = config::Configuration::default().path(path.into()).read()?;

    let db = match config.postgres {
        Some(ref config) => {
            database::Database::new(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::error!("missing `postgres` entry on `config.yaml` file and no `DATABASE_URL`");
            return Err("PostgreSQL is not configured".into());
        },
    };

    // handle notifications.
    let delivery: Arc<dyn Delivery> = match &config.notifier.webhook {
        Some(url) => Arc::new(WebhookDelivery::new(url.parse()?)),
        None => {
            tracing::warn!("no `notifier.webhook` set, notifications are only logged");
            Arc::new(LogDelivery)
        },
    };
    let (notifier, worker) =
        Notifier::spawn(delivery, notifier::Options::from(&config.notifier));

    let metrics = if config.telemetry.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    let onboarding = Onboarding::new(
        db.clone(),
        Arc::new(RandomAccountNumber::new(config.account.number_length.max(1))),
        notifier,
        config.account.clone(),
        config.transaction_timeout(),
    );

    Ok((
        AppState {
            config,
            db,
            onboarding,
            metrics,
        },
        worker,
    ))
}
