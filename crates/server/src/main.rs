mod api;
mod cli;
mod pipeline;
mod query_store;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deepthink_llm::GenerationSettings;

use crate::cli::Cli;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    deepthink_core::config::load_dotenv();
    let cli = Cli::parse();
    let config = cli.config();
    config.log_summary();
    tracing::debug!(config = %config.redacted_summary(), "effective configuration");

    let provider = deepthink_llm::create_provider(&config.llm, &config.ollama)
        .context("LLM provider not available")?;
    info!(
        provider = provider.provider_name(),
        model = provider.model(),
        "LLM provider ready"
    );

    let settings = GenerationSettings {
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
    };
    let state = Arc::new(AppState::new(provider, settings)?);
    let cors = router::cors_layer(&config.server.cors_origin)?;
    let app = router::build_router(state, cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
