use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chatrelay::api::create_router;
use chatrelay::app::config::ServerConfig;
use chatrelay::app::{AppConfig, AppState};
use chatrelay::cli::{Cli, Commands};
use chatrelay::models::{Preset, ProviderKind};
use chatrelay::storage::MemoryKvStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = init_tracing(cli.debug, &config)?;

    match cli.command.unwrap_or_default() {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Models { provider, preset } => {
            show_models(config, provider.map(Into::into), preset.map(Into::into)).await
        }
        Commands::Config => {
            print!("{}", config.to_redacted_toml()?);
            Ok(())
        }
    }
}

/// Console logging, plus a daily rolling file when `logging.directory` is set.
fn init_tracing(debug: bool, config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let directive = if debug { "chatrelay=debug" } else { "chatrelay=info" };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, "chatrelay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!("Starting chatrelay v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.server.bind_address();
    let cors = cors_layer(&config.server)?;
    let state = AppState::new(config).await?;

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn cors_layer(server: &ServerConfig) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.cors_origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = server
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn show_models(
    config: AppConfig,
    provider: Option<ProviderKind>,
    preset: Option<Preset>,
) -> Result<()> {
    // Catalog lookups never touch the rate-limit store.
    let state = AppState::with_store(config, Arc::new(MemoryKvStore::new()))?;
    let orchestrator = state.orchestrator();

    for kind in ProviderKind::ALL {
        if provider.is_some_and(|p| p != kind) {
            continue;
        }

        let models = orchestrator.client(kind).describe().await;
        let status = if models.configured { "configured" } else { "not configured" };
        println!("{} ({}, {} models in catalog)", kind, status, models.catalog.len());

        for (model_preset, model) in &models.resolved {
            if preset.is_some_and(|p| p != *model_preset) {
                continue;
            }
            println!("  {:<8} -> {}", model_preset.as_str(), model);
        }
    }

    Ok(())
}
