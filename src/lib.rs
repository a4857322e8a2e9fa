//! Ollama Relay - a local CORS relay for an Ollama server
//!
//! Browser extensions cannot call a local Ollama server directly because of cross-origin
//! restrictions. This library serves a small mirror of the Ollama API with permissive CORS
//! headers and forwards each request, unchanged, to a single fixed upstream.

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::any::Any;
use std::borrow::Cow;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

pub mod client;
pub mod errors;
pub mod forward;
pub mod handlers;
pub mod models;
pub mod test_utils;
pub mod upstream;

use client::HttpClient;
use errors::ErrorEnvelope;
use forward::VersionCheck;
use upstream::Upstream;

/// 50 MiB, large enough for base64-encoded images in generate requests.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// The main application state: the upstream client and the fixed relay settings.
#[derive(Clone, Debug)]
pub struct AppState<T: HttpClient> {
    pub http_client: T,
    pub upstream: Upstream,
    pub body_limit: usize,
}

impl<T: HttpClient> AppState<T> {
    /// Create a new AppState with a custom HTTP client (useful for testing)
    pub fn with_client(upstream: Upstream, http_client: T) -> Self {
        Self {
            http_client,
            upstream,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

/// Any origin may call the relay, with credentials. A literal `*` origin cannot be combined with
/// credentials, so the caller's origin and requested headers are mirrored back instead.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Handler panicked: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(ErrorEnvelope::new(format!("internal relay error: {detail}"))),
    )
        .into_response()
}

/// Build the main router for the relay
/// This creates routes for:
/// - `/proxy/generate` - Forwards to the upstream `/api/generate`
/// - `/proxy/tags` - Forwards to the upstream `/api/tags`
/// - `/check-ollama` - Reports upstream reachability
/// - `/status` - Local liveness
/// - `/echo` - Echoes the request body and headers
#[instrument(skip(state))]
pub fn build_router<T: HttpClient + Clone + Send + Sync + 'static>(state: AppState<T>) -> Router {
    info!("Building router");
    let body_limit = state.body_limit;
    Router::new()
        .route("/proxy/generate", post(handlers::generate))
        .route("/proxy/tags", get(handlers::tags))
        .route("/check-ollama", get(handlers::check_upstream))
        .route("/status", get(handlers::status))
        .route("/echo", post(handlers::echo))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Probes the upstream version endpoint once, in the background. The outcome is only logged; the
/// relay serves requests whether or not the upstream is up.
pub fn spawn_startup_probe<T: HttpClient + Send + Sync + 'static>(
    state: AppState<T>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let url = state.upstream.display_url();
        match forward::check_version(&state.http_client, &state.upstream).await {
            Ok(VersionCheck::Reachable(info)) => info!(
                "Connected to upstream at {} (version {}) successfully",
                url,
                info.version
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            Ok(VersionCheck::Rejected { status, .. }) => {
                warn!(
                    "Cannot connect to upstream server at {}: responded with {}",
                    url, status
                );
                warn!("Please make sure Ollama is running before using the relay");
            }
            Err(e) => {
                warn!("Cannot connect to upstream server at {}: {}", url, e);
                warn!("Please make sure Ollama is running before using the relay");
            }
        }
    })
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
///
/// `prefix` is prepended to every metric name, e.g. `relay_http_requests_total`.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}
