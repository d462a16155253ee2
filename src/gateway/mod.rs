//! Event gateway
//!
//! Routes client events to the connection's session or to the command
//! executor, and relays everything they produce back as [`OutboundEvent`]s.
//! The gateway is transport-agnostic: a transport calls [`EventGateway::connect`],
//! feeds decoded events to [`EventGateway::dispatch`], writes whatever arrives
//! on the returned receiver, and calls [`EventGateway::disconnect`] when the
//! client goes away. [`server`] is the TCP transport.

mod forward;
mod output;
pub mod server;
mod system;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::error::BridgeError;
use crate::executor::CommandExecutor;
use crate::probe;
use crate::registry::SessionRegistry;
use crate::status::StatusBoard;
use crate::types::events::ClassifiedEvent;
use crate::types::gateway::{InboundEvent, OutboundEvent, OutputType};
use crate::types::identifiers::ConnectionId;
use crate::types::options::BridgeConfig;

use forward::spawn_forwarder;
use output::{command_events, task_events};
use system::SystemCommand;

/// Delay between acknowledging `/restart` and requesting shutdown
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Sender half for one client connection
pub type OutboundSender = mpsc::UnboundedSender<OutboundEvent>;

/// Receiver half for one client connection
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundEvent>;

/// Routes events between clients, sessions and the executor
pub struct EventGateway {
    registry: SessionRegistry,
    executor: CommandExecutor,
    board: Arc<StatusBoard>,
    cli_program: String,
    connections: Mutex<HashMap<ConnectionId, OutboundSender>>,
    forwarders: Mutex<HashMap<ConnectionId, JoinHandle<()>>>,
    shutdown: Notify,
}

impl EventGateway {
    /// Gateway for a full bridge configuration
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Arc<Self> {
        Self::with_parts(
            SessionRegistry::new(config.session.clone()),
            CommandExecutor::new(config.executor.clone()),
            config.session.program.clone(),
        )
    }

    /// Gateway over existing components
    #[must_use]
    pub fn with_parts(
        registry: SessionRegistry,
        executor: CommandExecutor,
        cli_program: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            executor,
            board: Arc::new(StatusBoard::new()),
            cli_program: cli_program.into(),
            connections: Mutex::new(HashMap::new()),
            forwarders: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        })
    }

    /// Session registry
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Command executor
    #[must_use]
    pub const fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Shared status board
    #[must_use]
    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// Number of connected clients
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Register a new client connection
    ///
    /// The receiver immediately holds a `system_status` snapshot.
    pub fn connect(&self) -> (ConnectionId, OutboundReceiver) {
        let connection_id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();

        self.board.set_connected(true);
        let _ = tx.send(OutboundEvent::SystemStatus(self.board.snapshot()));
        self.connections.lock().insert(connection_id.clone(), tx);

        log::info!("Client connected: {connection_id}");
        (connection_id, rx)
    }

    /// Tear down everything owned by a connection
    ///
    /// The connection's session is removed from the registry and stopped.
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        let remaining = {
            let mut connections = self.connections.lock();
            connections.remove(connection_id);
            connections.len()
        };
        if let Some(forwarder) = self.forwarders.lock().remove(connection_id) {
            forwarder.abort();
        }
        self.board.set_connected(remaining > 0);

        match self.registry.remove(connection_id).await {
            Ok(true) => log::info!("Client disconnected: {connection_id} (session stopped)"),
            Ok(false) => log::info!("Client disconnected: {connection_id}"),
            Err(e) => {
                log::warn!("Client disconnected: {connection_id}, session cleanup failed: {e}");
            }
        }
    }

    /// Resolves once a client asked the server to restart
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }

    /// Handle one event from a client
    ///
    /// Session events complete before this returns. Commands and tasks run in
    /// the background and report through the connection's receiver.
    pub async fn dispatch(self: &Arc<Self>, connection_id: &ConnectionId, event: InboundEvent) {
        log::debug!("[{connection_id}] {event:?}");
        match event {
            InboundEvent::StartSession => self.start_session(connection_id).await,
            InboundEvent::StopSession => self.stop_session(connection_id).await,
            InboundEvent::SendMessage { message } => {
                self.send_message(connection_id, &message).await;
            }
            InboundEvent::ExecuteCommand { command } => {
                let gateway = Arc::clone(self);
                let connection_id = connection_id.clone();
                tokio::spawn(async move {
                    gateway.execute_command(&connection_id, &command).await;
                });
            }
            InboundEvent::ExecuteTask { task } => {
                let gateway = Arc::clone(self);
                let connection_id = connection_id.clone();
                tokio::spawn(async move {
                    gateway.execute_task(&connection_id, &task).await;
                });
            }
            InboundEvent::GetStatus => {
                self.send_to(connection_id, OutboundEvent::SystemStatus(self.board.snapshot()));
            }
            InboundEvent::Restart => self.system_command(connection_id, SystemCommand::Restart),
            InboundEvent::CheckCli => {
                let program = self.cli_program.clone();
                let lookup = tokio::task::spawn_blocking(move || probe::cli_available(&program));
                let installed = lookup.await.unwrap_or(false);
                self.send_to(connection_id, OutboundEvent::CliStatus { installed });
            }
        }
    }

    /// Send to one connection; `false` if it is gone
    pub fn send_to(&self, connection_id: &ConnectionId, event: OutboundEvent) -> bool {
        self.connections
            .lock()
            .get(connection_id)
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Send to every connection
    pub fn broadcast(&self, event: &OutboundEvent) {
        self.connections
            .lock()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn broadcast_status(&self) {
        self.broadcast(&OutboundEvent::SystemStatus(self.board.snapshot()));
    }

    /// Relay a session-level error that subscribers did not already see
    fn session_error(&self, connection_id: &ConnectionId, error: &BridgeError) {
        let event = ClassifiedEvent::session_error(error.to_string())
            .with_metadata("code", serde_json::Value::from(error.code()));
        self.send_to(connection_id, OutboundEvent::ClaudeMessage(event));
    }

    async fn start_session(&self, connection_id: &ConnectionId) {
        let session = self.registry.get_or_create(connection_id).await;

        let tx = self.connections.lock().get(connection_id).cloned();
        if let Some(tx) = tx {
            self.forwarders
                .lock()
                .entry(connection_id.clone())
                .or_insert_with(|| spawn_forwarder(&session, tx));
        }

        match session.start().await {
            Ok(()) => {}
            // Launch failures were already published to the session's subscribers
            Err(BridgeError::LaunchError { .. }) => {}
            Err(e) => {
                log::warn!("[{connection_id}] start rejected: {e}");
                self.session_error(connection_id, &e);
            }
        }
    }

    async fn stop_session(&self, connection_id: &ConnectionId) {
        let Some(session) = self.registry.get(connection_id).await else {
            return;
        };
        // A termination failure is published to subscribers by the session
        if let Err(e) = session.stop().await {
            log::warn!("[{connection_id}] stop failed: {e}");
        }
    }

    async fn send_message(&self, connection_id: &ConnectionId, message: &str) {
        let result = match self.registry.get(connection_id).await {
            Some(session) => session.send(message),
            None => Err(BridgeError::not_running(connection_id.as_str())),
        };
        if let Err(e) = result {
            self.session_error(connection_id, &e);
        }
    }

    async fn execute_command(self: &Arc<Self>, connection_id: &ConnectionId, command: &str) {
        let command = command.trim();
        if command.starts_with('/') {
            self.system_command(connection_id, SystemCommand::parse(command));
            return;
        }

        log::info!("[{connection_id}] executing command: {command}");
        let limit = self.executor.config().command_timeout;
        let events = match self.executor.run_command(command).await {
            Ok(output) => command_events(command, &output, limit),
            Err(e) => vec![OutboundEvent::output(e.to_string(), OutputType::Error)],
        };
        for event in events {
            self.send_to(connection_id, event);
        }
    }

    fn system_command(self: &Arc<Self>, connection_id: &ConnectionId, command: SystemCommand) {
        match command {
            SystemCommand::Status => {
                let event = match serde_json::to_string_pretty(&self.board.snapshot()) {
                    Ok(json) => OutboundEvent::output(json, OutputType::Info),
                    Err(e) => OutboundEvent::output(e.to_string(), OutputType::Error),
                };
                self.send_to(connection_id, event);
            }
            SystemCommand::Help => {
                let help = system::help_text(self.executor.tasks());
                self.send_to(connection_id, OutboundEvent::output(help, OutputType::Info));
            }
            // Clearing is done by the client
            SystemCommand::Clear => {}
            SystemCommand::Restart => {
                log::info!("[{connection_id}] restart requested");
                self.send_to(
                    connection_id,
                    OutboundEvent::output("Restarting server...", OutputType::Info),
                );
                let gateway = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(RESTART_DELAY).await;
                    gateway.shutdown.notify_one();
                });
            }
            SystemCommand::Unknown(name) => {
                self.send_to(
                    connection_id,
                    OutboundEvent::output(
                        format!("Unknown command: {name}. Type /help for available commands."),
                        OutputType::Error,
                    ),
                );
            }
        }
    }

    async fn execute_task(&self, connection_id: &ConnectionId, task_id: &str) {
        let Some(task) = self.executor.task(task_id).cloned() else {
            log::warn!("[{connection_id}] unknown task: {task_id}");
            self.send_to(
                connection_id,
                OutboundEvent::output(
                    BridgeError::unknown_task(task_id).to_string(),
                    OutputType::Error,
                ),
            );
            self.send_to(
                connection_id,
                OutboundEvent::TaskComplete {
                    task: task_id.to_string(),
                    success: false,
                },
            );
            return;
        };

        log::info!("[{connection_id}] executing task: {}", task.id);
        self.board.task_started();
        self.broadcast_status();

        let result = self
            .executor
            .run_task_with_progress(&task.id, |progress| {
                self.send_to(
                    connection_id,
                    OutboundEvent::TaskProgress {
                        task: task.display_name.clone(),
                        progress,
                    },
                );
            })
            .await;

        let limit = self.executor.config().task_timeout;
        let (events, success) = match result {
            Ok(output) => task_events(&output, limit),
            Err(e) => (
                vec![OutboundEvent::output(e.to_string(), OutputType::Error)],
                false,
            ),
        };
        for event in events {
            self.send_to(connection_id, event);
        }
        self.send_to(
            connection_id,
            OutboundEvent::TaskComplete {
                task: task.display_name.clone(),
                success,
            },
        );
        log::info!("[{connection_id}] task {} finished (success: {success})", task.id);

        self.board.task_finished();
        self.broadcast_status();
    }
}

impl std::fmt::Debug for EventGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventGateway")
            .field("cli_program", &self.cli_program)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}
