use relaymeter::server::{AppState, router};
use relaymeter::config::RelayConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relaymeter=info")),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let state = AppState::from_config(&config)?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "relaymeter listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
