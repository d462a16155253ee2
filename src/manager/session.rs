//! Process session: one logical owner of at most one long-lived subprocess
//!
//! ```text
//! Idle ─start─▶ Starting ─spawn ok─▶ Running ─stop─▶ Stopping ─▶ Stopped
//!                  │                    │                          │
//!                  └─spawn err─▶ Failed ◀─abnormal exit            └─start─▶ Starting
//! ```
//!
//! `start` and `stop` are serialized by an async control lock, so racing
//! calls on one session always leave it in a state that matches its handle.
//! Session data itself sits behind a short synchronous lock that is never
//! held across an await.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::background::{spawn_output_pump, spawn_stdin_writer, spawn_supervisor};
use super::commands::SupervisorCommand;
use super::fanout::{EventSubscription, Fanout};
use crate::error::{BridgeError, Result};
use crate::message::OutputClassifier;
use crate::transport::{ExitReport, SpawnSpec, SpawnedProcess, Spawner, SubprocessSpawner};
use crate::types::events::{ClassifiedEvent, StreamKind};
use crate::types::identifiers::SessionId;
use crate::types::options::SessionOptions;

/// Lifecycle state of a [`ProcessSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Never started
    Idle,
    /// Spawn in progress
    Starting,
    /// Process running
    Running,
    /// Termination in progress
    Stopping,
    /// Stopped; may be started again
    Stopped,
    /// Launch failed, the process died abnormally, or it could not be stopped
    Failed,
}

impl SessionState {
    /// `start()` is rejected in these states
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Rest states where `stop()` is a no-op
    #[must_use]
    pub const fn is_at_rest(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }
}

/// Everything tied to one process run
struct ProcessLink {
    epoch: u64,
    pid: Option<u32>,
    input_tx: mpsc::UnboundedSender<String>,
    command_tx: mpsc::UnboundedSender<SupervisorCommand>,
    pumps: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl ProcessLink {
    fn abort_io(&self) {
        for pump in &self.pumps {
            pump.abort();
        }
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}

struct SessionCore {
    state: SessionState,
    link: Option<ProcessLink>,
    closed: bool,
}

/// State shared between a session and its background tasks
pub(super) struct SessionShared {
    pub(super) id: SessionId,
    pub(super) fanout: Fanout,
    core: Mutex<SessionCore>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionShared {
    fn transition(&self, core: &mut SessionCore, next: SessionState) {
        if core.state != next {
            log::debug!("[{}] {:?} -> {:?}", self.id, core.state, next);
        }
        core.state = next;
        self.state_tx.send_replace(next);
    }

    /// Called by the supervisor when the process exits on its own
    pub(super) fn on_process_exit(&self, epoch: u64, result: std::io::Result<ExitReport>) {
        let mut core = self.core.lock();
        // A stop in progress has already taken the link and owns the outcome
        if !core.link.as_ref().is_some_and(|link| link.epoch == epoch) {
            return;
        }
        let link = core.link.take();

        let failure = match result {
            Ok(report) if report.success() => {
                log::info!("[{}] process exited normally", self.id);
                None
            }
            Ok(report) => Some(format!("CLI process exited unexpectedly ({report})")),
            Err(e) => Some(format!("CLI process error: {e}")),
        };

        match failure {
            Some(message) => {
                log::warn!("[{}] {}", self.id, message);
                self.fanout
                    .publish_for(epoch, ClassifiedEvent::session_error(message));
                self.transition(&mut core, SessionState::Failed);
            }
            None => self.transition(&mut core, SessionState::Stopped),
        }
        drop(core);

        // Pumps keep draining whatever the process left in its pipes
        if let Some(link) = link
            && let Some(writer) = link.writer
        {
            writer.abort();
        }
    }
}

/// A logical owner of at most one long-lived subprocess
///
/// Output lines from the process's stdout and stderr are framed, classified
/// and delivered to every current subscriber. Stdin writes are fire-and-forget:
/// `send` queues the line and returns without waiting for the process to read it.
pub struct ProcessSession {
    shared: Arc<SessionShared>,
    options: SessionOptions,
    spawner: Arc<dyn Spawner>,
    control: tokio::sync::Mutex<()>,
}

impl ProcessSession {
    /// Create an idle session that spawns with `tokio::process`
    #[must_use]
    pub fn new(id: SessionId, options: SessionOptions) -> Self {
        Self::with_spawner(id, options, Arc::new(SubprocessSpawner::new()))
    }

    /// Create an idle session with a custom spawn capability
    #[must_use]
    pub fn with_spawner(id: SessionId, options: SessionOptions, spawner: Arc<dyn Spawner>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            shared: Arc::new(SessionShared {
                id,
                fanout: Fanout::new(),
                core: Mutex::new(SessionCore {
                    state: SessionState::Idle,
                    link: None,
                    closed: false,
                }),
                state_tx,
            }),
            options,
            spawner,
            control: tokio::sync::Mutex::new(()),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    /// Options the session spawns with
    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state
    }

    /// Whether a process is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// OS process id of the running process
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.shared.core.lock().link.as_ref().and_then(|link| link.pid)
    }

    /// Receiver that observes every state transition
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to classified events
    ///
    /// Events produced before this call are not replayed.
    pub fn subscribe(&self) -> EventSubscription {
        self.shared.fanout.subscribe()
    }

    /// Spawn the process and wire its output pipelines
    ///
    /// Optimistic: the session is `Running` as soon as the spawn call returns.
    ///
    /// # Errors
    /// - `AlreadyRunning` if a process is already starting or running
    /// - `SessionClosed` if the session was closed
    /// - `LaunchError` if the OS refused to launch the program (the session
    ///   becomes `Failed` and subscribers get an `Error` event)
    pub async fn start(&self) -> Result<()> {
        let _control = self.control.lock().await;

        let spec = {
            let mut core = self.shared.core.lock();
            if core.closed {
                return Err(BridgeError::session_closed(self.shared.id.as_str()));
            }
            if core.state.is_active() {
                return Err(BridgeError::already_running(self.shared.id.as_str()));
            }
            self.shared.transition(&mut core, SessionState::Starting);
            SpawnSpec::from_options(&self.options)
        };

        let spawned = match self.spawner.spawn(&spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                let err = BridgeError::launch(&spec.program, e);
                log::error!("[{}] {}", self.shared.id, err);
                self.shared
                    .fanout
                    .publish(ClassifiedEvent::session_error(format!("CLI process error: {err}")));
                let mut core = self.shared.core.lock();
                self.shared.transition(&mut core, SessionState::Failed);
                return Err(err);
            }
        };

        // Held while wiring so an instant exit can't be reported before the
        // link is stored
        let mut core = self.shared.core.lock();
        let link = self.wire(spawned);
        log::info!(
            "[{}] started '{}' (pid {:?})",
            self.shared.id,
            spec.program,
            link.pid
        );
        core.link = Some(link);
        self.shared.transition(&mut core, SessionState::Running);
        Ok(())
    }

    fn wire(&self, spawned: SpawnedProcess) -> ProcessLink {
        let SpawnedProcess {
            stdin,
            stdout,
            stderr,
            handle,
        } = spawned;

        let epoch = self.shared.fanout.advance();
        let pid = handle.id();

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            pumps.push(spawn_output_pump(
                stdout,
                StreamKind::Stdout,
                OutputClassifier::standard(),
                self.options.max_line_length,
                Arc::clone(&self.shared),
                epoch,
            ));
        }
        if let Some(stderr) = stderr {
            pumps.push(spawn_output_pump(
                stderr,
                StreamKind::Stderr,
                OutputClassifier::diagnostics(),
                self.options.max_line_length,
                Arc::clone(&self.shared),
                epoch,
            ));
        }

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let writer = stdin.map(|stdin| {
            spawn_stdin_writer(stdin, input_rx, self.shared.id.as_str().to_string())
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        spawn_supervisor(handle, command_rx, Arc::clone(&self.shared), epoch);

        ProcessLink {
            epoch,
            pid,
            input_tx,
            command_tx,
            pumps,
            writer,
        }
    }

    /// Write `text` plus a newline to the process's stdin
    ///
    /// Fire-and-forget: there is no acknowledgment and no backpressure signal.
    ///
    /// # Errors
    /// Returns `NotRunning` unless the session is `Running` with a live stdin
    pub fn send(&self, text: &str) -> Result<()> {
        let core = self.shared.core.lock();
        match (core.state, core.link.as_ref()) {
            (SessionState::Running, Some(link)) => link
                .input_tx
                .send(format!("{text}\n"))
                .map_err(|_| BridgeError::not_running(self.shared.id.as_str())),
            _ => Err(BridgeError::not_running(self.shared.id.as_str())),
        }
    }

    /// Stop the process, if any
    ///
    /// No-op when `Idle` or `Stopped`. Event delivery is cut before the process
    /// is signalled, so no event reaches a subscriber after this returns.
    /// Bounded by the stop grace period plus a short reap window.
    ///
    /// # Errors
    /// - `TerminationError` if the process could not be signalled
    /// - `TimedOut` if it was still not reaped after the forced kill
    ///
    /// Either way the session is then `Failed` and subscribers get an `Error` event
    pub async fn stop(&self) -> Result<()> {
        let _control = self.control.lock().await;
        self.stop_locked().await
    }

    /// Stop the process and refuse any later `start()`
    ///
    /// # Errors
    /// Same as [`stop`](Self::stop)
    pub async fn close(&self) -> Result<()> {
        let _control = self.control.lock().await;
        self.shared.core.lock().closed = true;
        self.stop_locked().await
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.core.lock().closed
    }

    async fn stop_locked(&self) -> Result<()> {
        let link = {
            let mut core = self.shared.core.lock();
            if core.state.is_at_rest() {
                return Ok(());
            }
            let link = core.link.take();
            if link.is_none() {
                // Failed with nothing left to release
                self.shared.transition(&mut core, SessionState::Stopped);
                return Ok(());
            }
            self.shared.transition(&mut core, SessionState::Stopping);
            self.shared.fanout.advance();
            link
        };
        let Some(link) = link else {
            return Ok(());
        };

        // Aborting the pumps drops their framers and any partial lines
        link.abort_io();

        let (response_tx, response_rx) = oneshot::channel();
        let outcome = match link.command_tx.send(SupervisorCommand::Terminate {
            grace: self.options.stop_grace,
            response_tx,
        }) {
            // Supervisor already gone: the process exited and was reaped
            Err(_) => Ok(None),
            Ok(()) => match response_rx.await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            },
        };

        let mut core = self.shared.core.lock();
        match outcome {
            Ok(report) => {
                log::info!(
                    "[{}] stopped (pid {:?}, {})",
                    self.shared.id,
                    link.pid,
                    report.map_or_else(|| "already exited".to_string(), |r| r.to_string())
                );
                self.shared.transition(&mut core, SessionState::Stopped);
                Ok(())
            }
            Err(e) => {
                let err = if e.kind() == std::io::ErrorKind::TimedOut {
                    BridgeError::timeout(format!(
                        "session {} did not exit after kill: {e}",
                        self.shared.id
                    ))
                } else {
                    BridgeError::termination(self.shared.id.as_str(), e.to_string())
                };
                log::error!("{err}");
                self.shared
                    .fanout
                    .publish(ClassifiedEvent::session_error(err.to_string()));
                self.shared.transition(&mut core, SessionState::Failed);
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("program", &self.options.program)
            .finish_non_exhaustive()
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        // Dropping the link closes the supervisor's command channel, which
        // kills the process
        if let Some(link) = self.shared.core.lock().link.take() {
            link.abort_io();
        }
    }
}
