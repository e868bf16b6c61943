//! Server binary: loads configuration, builds the content graph once and
//! serves the API until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use contentflow::config::ContentflowConfig;
use contentflow::events::{EventBus, LoggingEventSink};
use contentflow::gateway::ProgressGateway;
use contentflow::jobs::JobRegistry;
use contentflow::pipeline::{content_graph, Orchestrator};
use contentflow::stages::content::ContentStages;
use contentflow_server::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "contentflow-server")]
#[command(version)]
#[command(about = "Content generation pipeline server", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, value_name = "FILE", env = "CONTENTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Socket address to bind, overriding the config file.
    #[arg(long, env = "CONTENTFLOW_BIND")]
    bind: Option<String>,

    #[arg(long, value_enum, default_value = "text", env = "CONTENTFLOW_LOG_FORMAT")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,contentflow=info,contentflow_server=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = match &cli.config {
        Some(path) => ContentflowConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ContentflowConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let graph = content_graph(ContentStages::from_config(&config.stages))
        .context("content pipeline graph is invalid")?;
    info!(stages = graph.len(), interrupt = graph.interrupt_stage(), "Pipeline graph built");

    let bus = EventBus::new(config.gateway.channel_capacity)
        .with_sink(Arc::new(LoggingEventSink::default()));
    let registry = Arc::new(JobRegistry::new(Arc::new(bus)));
    let orchestrator =
        Orchestrator::new(graph, Arc::clone(&registry)).with_retry(config.orchestrator.clone());
    let gateway = ProgressGateway::from_config(registry, &config.gateway);
    let app = router(AppState::new(orchestrator, gateway), config.server.cors_allow_any);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!(addr = %listener.local_addr()?, "Contentflow server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
