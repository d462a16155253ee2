//! Predefined task definitions

use serde::{Deserialize, Serialize};

/// A named, predefined shell command
///
/// Tasks are looked up by `id` and never change at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Stable identifier used by clients (`system-check`, ...)
    pub id: String,
    /// Name shown in progress and completion events
    pub display_name: String,
    /// Shell command line, run through the platform shell
    pub shell_command: String,
    /// One-line description for help output
    pub description: String,
}

impl TaskSpec {
    /// Create a task definition
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        shell_command: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            shell_command: shell_command.into(),
            description: description.into(),
        }
    }

    /// The stock task set offered by the control panel
    ///
    /// Project tasks run in the executor's working directory.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "system-check",
                "System Check",
                "echo \"System Status: OK\" && echo \"Node Version:\" && node --version && echo \"Bun Version:\" && bun --version",
                "Run system diagnostics",
            ),
            Self::new(
                "build-project",
                "Build Project",
                "bun run build 2>&1 || echo \"Build completed with warnings\"",
                "Build the Next.js project",
            ),
            Self::new(
                "run-tests",
                "Run Tests",
                "bun run lint 2>&1 || echo \"Lint check completed\"",
                "Run linting and tests",
            ),
            Self::new(
                "deploy",
                "Deploy",
                "echo \"Deploying to production...\" && sleep 2 && echo \"Deployment successful!\"",
                "Deploy the application",
            ),
        ]
    }
}
