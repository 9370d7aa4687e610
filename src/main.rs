//! Dockwatch - HTTP server entry point
//!
//! For the command-line client, use the `dockwatch-cli` crate.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;

use dockwatch::{AppHandle, Config, create_app, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let config = Config::load().map_err(|e| {
        std::io::Error::other(format!(
            "Failed to load configuration. Check DATABASE_URL and DOCKWATCH__* env vars: {}",
            e
        ))
    })?;

    // Logging config lives in the loaded configuration
    init_tracing(&config.logging)?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let enable_docs = config.server.enable_docs;

    let AppHandle {
        router,
        shutdown_token,
        dispatch_logger,
    } = create_app(config)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to create application: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, enable_docs, "Dockwatch server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are done; let background tasks finish their queues
    shutdown_token.cancel();
    if let Some(logger) = dispatch_logger {
        wait_for_task("dispatch logger", logger, shutdown_timeout).await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "Shutting down"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "Shutting down"),
    }
}

/// Wait up to `timeout` for a background task, then give up on it
async fn wait_for_task(name: &str, task: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(())) => tracing::debug!(task = name, "Background task finished"),
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
        Err(_) => tracing::warn!(task = name, ?timeout, "Background task still running at shutdown"),
    }
}
