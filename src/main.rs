use std::time::Duration;

use tracing_subscriber::EnvFilter;

use repo_chat::api;
use repo_chat::config::Config;
use repo_chat::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Context store: {}", config.store);
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;

    // Expire idle sessions
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sweeper.sweep_expired();
            if evicted > 0 {
                tracing::info!("Expired {evicted} idle sessions");
            }
        }
    });

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
