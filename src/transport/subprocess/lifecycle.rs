//! Signalling and reaping for subprocess handles

use futures::FutureExt;
use futures::future::BoxFuture;
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::transport::{ExitReport, ProcessHandle};

use super::transport::SubprocessHandle;

impl ProcessHandle for SubprocessHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> std::io::Result<()> {
        // Already reaped: nothing left to signal
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(std::io::Error::other)?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            // Exited between the id() check and the signal
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(std::io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> std::io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> std::io::Result<()> {
        match self.child.start_kill() {
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitReport>> {
        Ok(self.child.try_wait()?.map(ExitReport::from))
    }

    fn wait(&mut self) -> BoxFuture<'_, std::io::Result<ExitReport>> {
        async move { self.child.wait().await.map(ExitReport::from) }.boxed()
    }
}
