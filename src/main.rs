use std::sync::Arc;

use grand_livre::{
    api::{self, AppState},
    config::Config,
    settlement::HttpSettlementClient,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,grand_livre=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let settlement =
        HttpSettlementClient::new(config.bank_api_url.as_str(), config.settlement_timeout)?;
    let state = AppState::new(&config, Arc::new(settlement));

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        bank_api_url = %config.bank_api_url,
        "Ledger service listening"
    );
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Failed to listen for the shutdown signal");
    }
    tracing::info!("Shutting down");
}
