//! Command building logic for subprocess transport

use std::process::Stdio;
use tokio::process::Command;

use crate::VERSION;
use crate::types::options::DANGEROUS_ENV_VARS;
use crate::transport::SpawnSpec;

/// Command builder for session processes
pub struct CommandBuilder<'a> {
    spec: &'a SpawnSpec,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    #[must_use]
    pub const fn new(spec: &'a SpawnSpec) -> Self {
        Self { spec }
    }

    /// Build the command with all three stdio streams piped
    ///
    /// Stderr is piped rather than inherited so the child cannot touch the
    /// server's terminal.
    #[must_use]
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args);

        // Inherited values are dropped too, not only explicit ones
        for key in DANGEROUS_ENV_VARS {
            cmd.env_remove(key);
        }
        cmd.envs(&self.spec.env);
        cmd.env("CLAUDE_BRIDGE_VERSION", VERSION);

        if let Some(ref cwd) = self.spec.cwd {
            cmd.env("PWD", cwd);
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}
