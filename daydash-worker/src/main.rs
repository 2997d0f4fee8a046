//! Daydash News Worker
//!
//! Polls the news feed, resolves linked stories and keeps the story store
//! up to date until interrupted.

use daydash_services::{shutdown_channel, NewsPipeline, NewsService, PipelineConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,daydash_worker=debug,daydash_services=debug")
        }))
        .init();

    info!("Starting Daydash news worker");

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Polling timeline of user {} every {}s with {} workers",
        config.user_id, config.poll_interval_secs, config.workers
    );

    let (trigger, shutdown) = shutdown_channel();
    let (pipeline, store) = NewsPipeline::from_config(&config, shutdown)?;

    let news_service = NewsService::new(store);
    match news_service.report(10).await {
        Ok(report) => info!("Story store holds {} recent stories", report.items.len()),
        Err(e) => error!("Failed to read recent stories: {}", e),
    }

    let handle = pipeline.start();

    wait_for_signal().await;
    info!("Shutdown requested, draining in-flight items");
    trigger.trigger();

    handle.join().await;
    info!("Daydash news worker stopped");

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
