//! llm-relay - service entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use llm_relay::config::Settings;
use llm_relay::orchestrator::ChatOrchestrator;
use llm_relay::server;

#[derive(Debug, Parser)]
#[command(name = "llm-relay", version, about = "HTTP gateway for local LLM inference servers")]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("llm_relay=info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    let orchestrator = Arc::new(ChatOrchestrator::from_settings(&settings)?);
    let app = server::router(orchestrator);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "llm-relay listening");

    axum::serve(listener, app).await?;
    Ok(())
}
