mod api;
mod bootstrap;
mod comp;
mod health;
mod quote_lines;

use std::time::Duration;

use anyhow::Result;
use wincomp_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use wincomp_core::config::LogFormat::*;

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
    // Logging depends on config, so config is loaded first.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "wincomp-server listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let router = api::app(app.state());
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined??;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        drain_secs = drain.as_secs(),
        "wincomp-server draining in-flight requests"
    );
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(drain, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish before the drain deadline"
        ),
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "wincomp-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
