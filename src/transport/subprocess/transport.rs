//! `tokio::process` implementation of the spawn capability

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

use crate::transport::{SpawnSpec, SpawnedProcess, Spawner};

use super::command::CommandBuilder;

/// Spawner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessSpawner;

impl SubprocessSpawner {
    /// Create a new spawner
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Handle to a child launched by [`SubprocessSpawner`]
///
/// Dropping the handle kills the child.
#[derive(Debug)]
pub struct SubprocessHandle {
    pub(super) child: Child,
}

impl Spawner for SubprocessSpawner {
    fn spawn(&self, spec: &SpawnSpec) -> std::io::Result<SpawnedProcess> {
        let mut cmd = CommandBuilder::new(spec).build();

        let mut child = cmd.spawn().map_err(|e| {
            if let Some(ref cwd) = spec.cwd
                && !cwd.exists()
            {
                return std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("working directory does not exist: {}", cwd.display()),
                );
            }
            e
        })?;

        log::debug!(
            "spawned '{}' {:?} as pid {:?}",
            spec.program,
            spec.args,
            child.id()
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        Ok(SpawnedProcess {
            stdin: stdin.map(|s| Box::new(s) as Box<dyn AsyncWrite + Send + Unpin>),
            stdout: stdout.map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>),
            stderr: stderr.map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>),
            handle: Box::new(SubprocessHandle { child }),
        })
    }
}
