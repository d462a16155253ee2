// Claude bridge server
//
// Serves the gateway over TCP until SIGINT, SIGTERM, or a client-issued
// `/restart`; a supervisor (systemd, docker, ...) is expected to restart it.

use anyhow::Result;
use claude_bridge::{BridgeConfig, start_server};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BridgeConfig::from_env()?;
    log::info!(
        "claude-bridge {} (program '{}', grace {}ms)",
        claude_bridge::VERSION,
        config.session.program,
        config.session.stop_grace.as_millis()
    );

    let server = start_server(config).await?;
    let gateway = std::sync::Arc::clone(server.gateway());

    tokio::select! {
        () = shutdown_signal() => log::info!("Received shutdown signal, shutting down server..."),
        () = gateway.shutdown_requested() => log::info!("Restart requested by client, shutting down server..."),
    }

    server.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
