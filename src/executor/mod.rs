//! One-shot command executor
//!
//! Runs an ad-hoc command line or a predefined task through the platform
//! shell with a hard timeout and a combined output cap. Each invocation is
//! independent; nothing is shared with process sessions.

mod capture;
mod shell;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{BridgeError, Result};
use crate::types::options::ExecutorConfig;
use crate::types::tasks::TaskSpec;

use capture::{CaptureBuffer, OutputBudget, read_capped};
use shell::{kill_tree, shell_command};

/// How long reader tasks may keep draining after the process is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for the kernel to reap a killed process
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Task progress is reported in these increments, from 0 to 100
const PROGRESS_INCREMENT: u8 = 20;

/// Result of one command execution
///
/// A timeout is a normal result, not an error: `timed_out` is set and the
/// captured output is whatever was read before the kill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
    /// The process exited by itself with a success status
    pub exited_normally: bool,
    /// The process was killed because it ran past its timeout
    pub timed_out: bool,
    /// Output hit the cap; the process was killed and the capture is a prefix
    pub truncated: bool,
    /// Wall-clock time from spawn to result
    pub duration: Duration,
}

/// Runs one-shot shell commands and predefined tasks
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: Arc<ExecutorConfig>,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl CommandExecutor {
    /// Create an executor with the given limits and task catalog
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Limits and catalog in use
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The predefined task catalog
    #[must_use]
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.config.tasks
    }

    /// Look up a predefined task
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&TaskSpec> {
        self.config.tasks.iter().find(|task| task.id == task_id)
    }

    /// Run an ad-hoc command with the configured timeout and cap
    ///
    /// # Errors
    /// Returns `LaunchError` if the shell could not be started
    pub async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        self.run(
            command,
            self.config.command_timeout,
            self.config.command_max_output,
        )
        .await
    }

    /// Run a predefined task by id
    ///
    /// # Errors
    /// - `UnknownTask` before anything is spawned if `task_id` is not in the catalog
    /// - `LaunchError` if the shell could not be started
    pub async fn run_task(&self, task_id: &str) -> Result<CommandOutput> {
        let task = self
            .task(task_id)
            .ok_or_else(|| BridgeError::unknown_task(task_id))?;
        log::info!("Running task '{}' ({})", task.id, task.display_name);
        self.run(
            &task.shell_command,
            self.config.task_timeout,
            self.config.task_max_output,
        )
        .await
    }

    /// Run a predefined task, reporting simulated progress first
    ///
    /// `on_progress` sees 0, 20, .., 100, each after one progress step delay,
    /// and then the task runs.
    ///
    /// # Errors
    /// Same as [`run_task`](Self::run_task); an unknown task reports no progress
    pub async fn run_task_with_progress<F>(
        &self,
        task_id: &str,
        mut on_progress: F,
    ) -> Result<CommandOutput>
    where
        F: FnMut(u8),
    {
        if self.task(task_id).is_none() {
            return Err(BridgeError::unknown_task(task_id));
        }
        for progress in (0..=100).step_by(usize::from(PROGRESS_INCREMENT)) {
            tokio::time::sleep(self.config.progress_step).await;
            on_progress(progress);
        }
        self.run_task(task_id).await
    }

    /// Run `command` through the platform shell
    ///
    /// Returns when the process exits, when `timeout` elapses, or when the
    /// combined output reaches `max_output_bytes`, whichever comes first. In
    /// the last two cases the process group is killed and reaped before
    /// returning.
    ///
    /// # Errors
    /// - `LaunchError` if the shell could not be started
    /// - `Io` if the process status could not be collected
    pub async fn run(
        &self,
        command: &str,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Result<CommandOutput> {
        let started = Instant::now();
        let mut cmd = shell_command(command, self.config.cwd.as_deref());
        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::launch(command, e))?;
        let leader = child.id();
        log::debug!("Executing command (pid {leader:?}): {command}");

        let budget = Arc::new(OutputBudget::new(max_output_bytes));
        let stdout_buf = CaptureBuffer::default();
        let stderr_buf = CaptureBuffer::default();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_capped(
                stdout,
                stdout_buf.clone(),
                Arc::clone(&budget),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_capped(
                stderr,
                stderr_buf.clone(),
                Arc::clone(&budget),
            )));
        }

        enum Outcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Capped,
        }

        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait()) => match result {
                Ok(status) => Outcome::Exited(status),
                Err(_) => Outcome::TimedOut,
            },
            () = budget.exhausted() => Outcome::Capped,
        };

        let timed_out = matches!(outcome, Outcome::TimedOut);
        let mut wait_error = None;
        let exited_normally = match outcome {
            Outcome::Exited(Ok(status)) => status.success(),
            Outcome::Exited(Err(e)) => {
                log::warn!("Failed to wait for command (pid {leader:?}): {e}");
                kill_tree(leader, &mut child);
                wait_error = Some(e);
                false
            }
            Outcome::TimedOut | Outcome::Capped => {
                kill_tree(leader, &mut child);
                if tokio::time::timeout(REAP_TIMEOUT, child.wait()).await.is_err() {
                    log::warn!("Command (pid {leader:?}) not reaped after kill");
                }
                false
            }
        };

        // Background children of the shell can hold the pipes open
        let drain = futures::future::join_all(readers.iter_mut());
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            log::debug!("Output of pid {leader:?} still open after exit, killing its group");
            kill_tree(leader, &mut child);
            for reader in &readers {
                reader.abort();
            }
        }

        if let Some(e) = wait_error {
            return Err(e.into());
        }

        let output = CommandOutput {
            stdout: stdout_buf.to_string_lossy(),
            stderr: stderr_buf.to_string_lossy(),
            exited_normally,
            timed_out,
            truncated: budget.is_exhausted(),
            duration: started.elapsed(),
        };

        if output.timed_out {
            log::warn!(
                "Command timed out after {}ms: {command}",
                timeout.as_millis()
            );
        } else {
            log::debug!(
                "Command finished in {}ms (ok: {}, truncated: {})",
                output.duration.as_millis(),
                output.exited_normally,
                output.truncated
            );
        }

        Ok(output)
    }
}
