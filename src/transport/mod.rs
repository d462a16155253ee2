//! Spawn capability used by process sessions
//!
//! A [`Spawner`] launches a program and hands back its three stdio streams
//! plus a [`ProcessHandle`] for signalling and reaping it. Sessions only see
//! these traits, so tests and embedders can substitute their own launcher.

pub mod subprocess;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::types::options::SessionOptions;

/// How long to wait for the OS to reap a process after a forced kill
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory (None = inherit)
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl SpawnSpec {
    /// Create a spec for a program with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    /// Build a spec from session options, dropping denylisted variables
    #[must_use]
    pub fn from_options(options: &SessionOptions) -> Self {
        Self {
            program: options.program.clone(),
            args: options.args.clone(),
            cwd: options.cwd.clone(),
            env: options
                .filtered_env()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, if the process exited on its own
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,
}

impl ExitReport {
    /// Whether the process exited with status zero
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<std::process::ExitStatus> for ExitReport {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ExitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// Control surface of a spawned process
pub trait ProcessHandle: Send {
    /// OS process id, if still known
    fn id(&self) -> Option<u32>;

    /// Ask the process to exit (SIGTERM on unix)
    ///
    /// # Errors
    /// Returns error if the signal cannot be delivered
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Force the process to exit without waiting for it
    ///
    /// # Errors
    /// Returns error if the kill cannot be delivered
    fn kill(&mut self) -> std::io::Result<()>;

    /// Non-blocking exit check
    ///
    /// # Errors
    /// Returns error if the status cannot be queried
    fn try_wait(&mut self) -> std::io::Result<Option<ExitReport>>;

    /// Wait for the process to exit. Cancel-safe.
    fn wait(&mut self) -> BoxFuture<'_, std::io::Result<ExitReport>>;
}

/// A freshly launched process
pub struct SpawnedProcess {
    /// Writable standard input
    pub stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    /// Readable standard output
    pub stdout: Option<Box<dyn AsyncRead + Send + Unpin>>,
    /// Readable standard error
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
    /// Signalling and exit notification
    pub handle: Box<dyn ProcessHandle>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.handle.id())
            .field("stdin", &self.stdin.as_ref().map(|_| "<pipe>"))
            .field("stdout", &self.stdout.as_ref().map(|_| "<pipe>"))
            .field("stderr", &self.stderr.as_ref().map(|_| "<pipe>"))
            .finish()
    }
}

/// Launches processes for sessions
pub trait Spawner: Send + Sync {
    /// Launch `spec`, returning the OS error if the launch itself fails
    ///
    /// # Errors
    /// Returns the OS error from the launch syscall
    fn spawn(&self, spec: &SpawnSpec) -> std::io::Result<SpawnedProcess>;
}

/// Terminate a process, escalating to a kill after `grace`
///
/// Never waits longer than `grace` plus a short reap window.
///
/// # Errors
/// Returns error if a signal cannot be delivered or the process is not reaped
/// after the forced kill
pub async fn terminate_with_grace(
    handle: &mut dyn ProcessHandle,
    grace: Duration,
) -> std::io::Result<ExitReport> {
    if let Some(report) = handle.try_wait()? {
        return Ok(report);
    }

    handle.terminate()?;
    log::debug!("sent termination request to pid {:?}", handle.id());

    if let Ok(result) = tokio::time::timeout(grace, handle.wait()).await {
        return result;
    }

    log::warn!(
        "pid {:?} did not exit within {}ms, killing",
        handle.id(),
        grace.as_millis()
    );
    handle.kill()?;
    tokio::time::timeout(KILL_REAP_TIMEOUT, handle.wait())
        .await
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "process was not reaped after kill",
            )
        })?
}

pub use subprocess::{SubprocessHandle, SubprocessSpawner};
