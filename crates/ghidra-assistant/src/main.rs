//! The assistant's HTTP server.

#[macro_use]
extern crate tracing;

use anyhow::Context as _;
use clap::Parser;
use ghidra_assistant::backend::HttpToolBackend;
use ghidra_assistant::config::Config;
use ghidra_assistant::{AssistantBuilder, server};
use ghidra_assistant_openai_model::OpenAIProvider;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    debug!(
        "using model {} at {}, analysis backend at {}",
        config.model_name, config.api_base, config.ghidra_api_base
    );

    let model_provider = OpenAIProvider::new(config.openai_config())
        .context("failed to create the model client")?;
    let backend =
        HttpToolBackend::new(&config.ghidra_api_base, config.tool_timeout())
            .context("failed to create the analysis backend client")?;

    let assistant = AssistantBuilder::new(model_provider, backend)
        .with_turn_budget(config.turn_budget)
        .with_retry_policy(config.retry_policy())
        .with_unknown_tool_policy(config.unknown_tool_policy())
        .with_parallel_tool_calls(config.parallel_tool_calls)
        .build();

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, server::router(assistant))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(err) => {
            error!("failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
    }
}
