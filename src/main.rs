use std::sync::Arc;

use anyhow::anyhow;
use edgesub::config::{ConfigError, load_config};
use edgesub::metrics::install_recorder;
use edgesub::ports::http_server::HttpServer;
use edgesub::tracing_setup::{init_tracing, shutdown_tracing};
use edgesub::utils::{GracefulShutdown, ShutdownReason};
use edgesub::{
    DetachedSpawner, FileLogSource, Orchestrator, ReqwestHttpClient, SubscriptionServer,
    SubscriptionSlot, TokioFileSystem,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match load_config() {
        Ok(config) => Arc::new(config),
        // --help and --version land here too; let clap print and exit
        Err(ConfigError::ParseError(e)) => e.exit(),
        Err(e) => return Err(anyhow!("{}", e)),
    };

    init_tracing(config.log_format).map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;

    let metrics_handle = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!("Metrics disabled: {}", err);
            None
        }
    };

    let shutdown = Arc::new(GracefulShutdown::new());
    let slot = Arc::new(SubscriptionSlot::new());

    let server = SubscriptionServer::with_dependencies(
        config.listen_addr(),
        config.sub_path.clone(),
        slot.clone(),
        metrics_handle,
        shutdown.clone(),
    );
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("Server error: {}", e);
            server_shutdown.trigger_shutdown(ShutdownReason::Force);
        }
    });

    let orchestrator = Orchestrator::with_dependencies(
        config.clone(),
        Arc::new(TokioFileSystem::new()),
        Arc::new(ReqwestHttpClient::new()),
        Arc::new(DetachedSpawner::new()),
        Arc::new(FileLogSource::new(config.boot_log_path())),
        slot,
    );

    let discovery_handle = match orchestrator.start().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            shutdown.trigger_shutdown(ShutdownReason::Force);
            let _ = server_handle.await;
            return Err(e.into());
        }
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let reason = shutdown.wait_for_shutdown_signal().await;
    tracing::info!("Shutting down: {:?}", reason);

    discovery_handle.abort();
    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    shutdown_tracing();
    match reason {
        ShutdownReason::Graceful => Ok(()),
        ShutdownReason::Force => Err(anyhow!("HTTP server stopped unexpectedly")),
    }
}
