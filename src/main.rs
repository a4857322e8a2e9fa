mod config;

use clap::Parser as _;
use config::Config;
use ollama_relay::{
    AppState, build_metrics_layer_and_handle, build_metrics_router, build_router, client,
    spawn_startup_probe, upstream::Upstream,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

#[tokio::main]
#[instrument]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Panics inside request handlers become 500 responses; this only makes sure they are logged.
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic: {}", panic_info);
    }));

    let config = Config::parse().validate()?;
    info!("Starting relay with config: {:?}", config);

    let upstream = Upstream::new(config.upstream_url.clone());
    let http_client = client::create_hyper_client(config.pool_settings());
    let app_state =
        AppState::with_client(upstream, http_client).with_body_limit(config.body_limit);

    let mut router = build_router(app_state.clone());

    if config.metrics {
        let (prometheus_layer, handle) = build_metrics_layer_and_handle(config.metrics_prefix);
        router = router.layer(prometheus_layer);

        let metrics_addr = SocketAddr::new(config.host, config.metrics_port);
        let metrics_listener = TcpListener::bind(metrics_addr).await?;
        info!("Metrics listening on {}", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, build_metrics_router(handle)).await {
                error!("Metrics server stopped: {}", e);
            }
        });
    }

    let bind_addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Relay running at http://{}", bind_addr);
    info!("Using upstream at {}", app_state.upstream.display_url());

    spawn_startup_probe(app_state);

    axum::serve(listener, router).await?;

    Ok(())
}
