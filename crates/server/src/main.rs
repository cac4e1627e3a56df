mod api;
mod bootstrap;
mod health;
pub mod service;

use std::time::Duration;

use anyhow::Result;
use loa_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use loa_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = health::router(app.db_pool.clone()).merge(api::router(app.api_state.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "loa-server started"
    );

    let shutdown_grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            wait_for_shutdown().await;
        })
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "loa-server stopping"
    );

    tokio::time::timeout(shutdown_grace, app.db_pool.close()).await.ok();

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
