use std::sync::Arc;
use std::time::Duration;

use delivery_market::api;
use delivery_market::config::{Config, LogFormat};
use delivery_market::engine::expiry::run_bidding_expiry;
use delivery_market::error::AppError;
use delivery_market::gateways::bills::HttpBillsAggregator;
use delivery_market::gateways::payment::HttpPaymentGateway;
use delivery_market::state::{AppState, DomainSettings};
use delivery_market::store::MemoryStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_client_timeout_secs))
        .build()
        .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

    let payments = HttpPaymentGateway::new(
        client.clone(),
        config.payment_gateway_url.clone(),
        config.payment_secret_key.clone(),
        config.currency.clone(),
    );
    let bills = HttpBillsAggregator::new(
        client,
        config.bills_api_url.clone(),
        config.bills_api_key.clone(),
        config.bills_public_key.clone(),
    );

    let state = Arc::new(AppState::new(
        Arc::new(MemoryStore::new(config.event_buffer_size)),
        Arc::new(payments),
        Arc::new(bills),
        DomainSettings::from_config(&config),
    ));

    tokio::spawn(run_bidding_expiry(
        state.clone(),
        Duration::from_secs(config.expiry_sweep_interval_secs.max(1)),
    ));

    let app = api::rest::router(state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
