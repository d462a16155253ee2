//! TCP transport for the gateway
//!
//! One JSON event per line in both directions. Each accepted socket becomes a
//! gateway connection with a fresh id; closing the socket disconnects it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use super::EventGateway;
use crate::status::spawn_metrics_reporter;
use crate::types::gateway::{InboundEvent, OutboundEvent, OutputType};
use crate::types::options::BridgeConfig;

/// Longest accepted inbound line (1MB)
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// A running gateway server
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    gateway: Arc<EventGateway>,
    stop_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    metrics_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the server is bound to
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The gateway behind the server
    #[must_use]
    pub fn gateway(&self) -> &Arc<EventGateway> {
        &self.gateway
    }

    /// Stop accepting, drop every connection and stop every session
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        self.metrics_task.abort();
        if let Err(e) = self.accept_task.await
            && !e.is_cancelled()
        {
            log::warn!("accept loop ended abnormally: {e}");
        }
        let stopped = self.gateway.registry().shutdown().await;
        log::info!("Server stopped ({stopped} session(s) closed)");
    }
}

/// Bind `config.listen_addr` and start serving in the background
///
/// # Errors
/// Returns an error if the address cannot be bound
pub async fn start_server(config: BridgeConfig) -> anyhow::Result<ServerHandle> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.listen_addr, e))?;
    start_server_with_listener(listener, config).await
}

/// Start serving on an already bound listener
///
/// # Errors
/// Returns an error if the listener's local address cannot be read
pub async fn start_server_with_listener(
    listener: TcpListener,
    config: BridgeConfig,
) -> anyhow::Result<ServerHandle> {
    let local_addr = listener.local_addr()?;
    let gateway = EventGateway::new(&config);

    let metrics_task = {
        let publisher = Arc::clone(&gateway);
        spawn_metrics_reporter(
            Arc::clone(gateway.board()),
            gateway.executor().clone(),
            config.metrics_interval,
            move |status| publisher.broadcast(&OutboundEvent::SystemStatus(status)),
        )
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&gateway), stop_rx));

    log::info!("Claude bridge listening on {local_addr}");
    Ok(ServerHandle {
        local_addr,
        gateway,
        stop_tx,
        accept_task,
        metrics_task,
    })
}

async fn accept_loop(
    listener: TcpListener,
    gateway: Arc<EventGateway>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let gateway = Arc::clone(&gateway);
                    let stop_rx = stop_rx.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, gateway, stop_rx).await;
                    });
                }
                Err(e) => log::error!("Failed to accept connection: {e}"),
            },
            _ = stop_rx.changed() => break,
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    gateway: Arc<EventGateway>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (connection_id, mut outbound) = gateway.connect();
    log::debug!("[{connection_id}] peer {peer}");

    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match InboundEvent::from_line(&line) {
                        Ok(event) => gateway.dispatch(&connection_id, event).await,
                        Err(e) => {
                            log::debug!("[{connection_id}] rejected frame: {e}");
                            gateway.send_to(
                                &connection_id,
                                OutboundEvent::output(format!("Invalid event: {e}"), OutputType::Error),
                            );
                        }
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    gateway.send_to(
                        &connection_id,
                        OutboundEvent::output("Event too large", OutputType::Error),
                    );
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    log::warn!("[{connection_id}] read error: {e}");
                    break;
                }
                None => break,
            },
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let line = match event.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("[{connection_id}] failed to encode event: {e}");
                        continue;
                    }
                };
                if let Err(e) = framed.send(line).await {
                    log::debug!("[{connection_id}] write failed: {e}");
                    break;
                }
            }
            _ = stop_rx.changed() => break,
        }
    }

    gateway.disconnect(&connection_id).await;
}
