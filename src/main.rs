use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use agri_vision_rs::{build_app, Config, StaticTokenVerifier, TaskSpec};

fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("agri-vision-rs v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("Failed to build the async runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    let verifier = StaticTokenVerifier::from_entries(&config.api_tokens);
    ensure!(!verifier.is_empty(), "No API tokens configured");

    let spec = TaskSpec::load(&config).context("Failed to load models")?;
    tracing::info!(
        pipelines = spec.keys().count(),
        workers = config.workers,
        max_upload_bytes = config.max_upload_bytes,
        "models ready"
    );

    let app = build_app(Arc::new(spec), Arc::new(verifier), config.max_upload_bytes);

    let addr = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
