use std::net::SocketAddr;

use anyhow::{Context, Result};
use lamports_service::config::Config;
use lamports_service::metric;
use lamports_service::service::BalanceService;

use crate::endpoints;

/// Creates the balance service and serves HTTP on the configured address until shutdown.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("lamports-web")
        .enable_all()
        .thread_stack_size(2 * megs)
        .build()?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address `{}`", config.bind))?;

    web_pool.block_on(async move {
        let service = BalanceService::create(config).context("failed to create service state")?;
        let app = endpoints::create_app(service);

        let listener = tokio::net::TcpListener::bind(socket)
            .await
            .with_context(|| format!("failed to bind to {socket}"))?;
        tracing::info!("Starting HTTP server on {}", socket);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        anyhow::Ok(())
    })?;
    tracing::info!("System shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = &error as &dyn std::error::Error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
