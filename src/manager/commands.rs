//! Command protocol for session supervisor tasks
//!
//! The supervisor task owns the process handle; the session reaches it only
//! through this channel, so no lock is held while a process is being reaped.

use std::time::Duration;
use tokio::sync::oneshot;

use crate::transport::ExitReport;

/// Commands that can be sent to a supervisor task
pub(super) enum SupervisorCommand {
    /// Terminate the process: polite request, then forced kill after `grace`
    Terminate {
        /// Time allowed between the request and the kill
        grace: Duration,
        /// Channel to send the exit report (or signalling error) back
        response_tx: oneshot::Sender<std::io::Result<ExitReport>>,
    },
}
