use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pbrelay::ProductboardClient;
use pbrelay_server::config::{RelayConfig, ResponseMode};
use pbrelay_server::dispatcher::Dispatcher;
use pbrelay_server::routes;
use pbrelay_server::state::AppState;

/// Largest accepted webhook body.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            tracing::error!("Refusing to start without a valid configuration");
            std::process::exit(1);
        }
    };

    let client = match ProductboardClient::new(config.client.clone()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let mode = match config.response_mode {
        ResponseMode::Async => "async (202, then process)",
        ResponseMode::Sync => "sync (process, then respond)",
    };

    tracing::info!("pbrelay listening on port {port}");
    tracing::info!("Upstream: {}", client.base_url());
    tracing::info!(
        "Retry: {} attempts, {}ms base delay",
        client.retry_config().max_attempts,
        client.retry_config().base_delay.as_millis()
    );
    tracing::info!("Response mode: {mode}");
    tracing::info!("  GET  http://localhost:{port}/?validationToken=...");
    tracing::info!("  POST http://localhost:{port}/");

    let state = web::Data::new(AppState {
        dispatcher: Dispatcher::new(client),
        response_mode: config.response_mode,
        metrics: config.metrics,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
