//! Bridge options and configuration
//!
//! This module contains the configuration for sessions, the command executor
//! and the server as a whole, with builders and an environment overlay.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BridgeError, Result};

use super::tasks::TaskSpec;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Program a session spawns by default
pub const DEFAULT_PROGRAM: &str = "claude";

/// Default listen port of the gateway (bound on loopback)
pub const DEFAULT_LISTEN_PORT: u16 = 3003;

/// Grace period between SIGTERM and SIGKILL when stopping a session (3 seconds)
pub const DEFAULT_STOP_GRACE_MS: u64 = 3000;

/// Longest line a session forwards before splitting it (1MB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Timeout for ad-hoc commands (30 seconds)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Output cap for ad-hoc commands (10MB)
pub const DEFAULT_COMMAND_MAX_OUTPUT: usize = 10 * 1024 * 1024;

/// Timeout for predefined tasks (60 seconds)
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 60_000;

/// Output cap for predefined tasks (20MB)
pub const DEFAULT_TASK_MAX_OUTPUT: usize = 20 * 1024 * 1024;

/// Delay between simulated task progress steps
pub const DEFAULT_PROGRESS_STEP_MS: u64 = 500;

/// Interval between host metrics broadcasts (5 seconds)
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 5000;

/// Dangerous environment variables that should not be passed to subprocesses
///
/// These variables can affect how the subprocess loads and executes code.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

// ============================================================================
// Session Options
// ============================================================================

/// How a session launches its long-lived subprocess
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Program name or path
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory for the process (None = inherit)
    pub cwd: Option<PathBuf>,
    /// Extra environment variables, filtered through [`DANGEROUS_ENV_VARS`]
    pub env: HashMap<String, String>,
    /// Time allowed between the termination request and the forced kill
    pub stop_grace: Duration,
    /// Bytes buffered per output line before the line is split
    pub max_line_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: vec!["--interactive".to_string()],
            cwd: None,
            env: HashMap::new(),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl SessionOptions {
    /// Create a new builder for `SessionOptions`
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    /// Environment entries that survive the denylist
    pub fn filtered_env(&self) -> impl Iterator<Item = (&String, &String)> {
        self.env
            .iter()
            .filter(|(key, _)| !DANGEROUS_ENV_VARS.contains(&key.as_str()))
    }
}

/// Builder for `SessionOptions`
#[derive(Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Set the program to spawn
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.options.program = program.into();
        self
    }

    /// Set the program arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Set the stop grace period
    #[must_use]
    pub const fn stop_grace(mut self, grace: Duration) -> Self {
        self.options.stop_grace = grace;
        self
    }

    /// Set the per-line buffering limit
    #[must_use]
    pub const fn max_line_length(mut self, bytes: usize) -> Self {
        self.options.max_line_length = bytes;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> SessionOptions {
        self.options
    }
}

// ============================================================================
// Executor Config
// ============================================================================

/// Limits and catalog for the one-shot command executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Working directory for commands and tasks (None = inherit)
    pub cwd: Option<PathBuf>,
    /// Timeout applied to ad-hoc commands
    pub command_timeout: Duration,
    /// Combined stdout+stderr cap for ad-hoc commands
    pub command_max_output: usize,
    /// Timeout applied to predefined tasks
    pub task_timeout: Duration,
    /// Combined stdout+stderr cap for predefined tasks
    pub task_max_output: usize,
    /// Delay between simulated progress steps of a task
    pub progress_step: Duration,
    /// Predefined tasks, immutable once the executor is built
    pub tasks: Vec<TaskSpec>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            command_max_output: DEFAULT_COMMAND_MAX_OUTPUT,
            task_timeout: Duration::from_millis(DEFAULT_TASK_TIMEOUT_MS),
            task_max_output: DEFAULT_TASK_MAX_OUTPUT,
            progress_step: Duration::from_millis(DEFAULT_PROGRESS_STEP_MS),
            tasks: TaskSpec::defaults(),
        }
    }
}

// ============================================================================
// Bridge Config
// ============================================================================

/// Top-level configuration of the bridge server
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the gateway listens on
    pub listen_addr: SocketAddr,
    /// Options for every per-connection session
    pub session: SessionOptions,
    /// Executor limits and task catalog
    pub executor: ExecutorConfig,
    /// Interval between host metrics broadcasts
    pub metrics_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_LISTEN_PORT)),
            session: SessionOptions::default(),
            executor: ExecutorConfig::default(),
            metrics_interval: Duration::from_millis(DEFAULT_METRICS_INTERVAL_MS),
        }
    }
}

impl BridgeConfig {
    /// Create a new builder for `BridgeConfig`
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Defaults overlaid with `CLAUDE_BRIDGE_*` environment variables
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a variable is present but malformed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary lookup function
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a value is present but malformed
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("CLAUDE_BRIDGE_ADDR") {
            config.listen_addr = addr.parse().map_err(|e| {
                BridgeError::invalid_config(format!("CLAUDE_BRIDGE_ADDR '{addr}': {e}"))
            })?;
        }
        if let Some(program) = lookup("CLAUDE_BRIDGE_PROGRAM") {
            if program.trim().is_empty() {
                return Err(BridgeError::invalid_config("CLAUDE_BRIDGE_PROGRAM is empty"));
            }
            config.session.program = program;
        }
        if let Some(args) = lookup("CLAUDE_BRIDGE_ARGS") {
            config.session.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(cwd) = lookup("CLAUDE_BRIDGE_CWD") {
            let cwd = PathBuf::from(cwd);
            config.session.cwd = Some(cwd.clone());
            config.executor.cwd = Some(cwd);
        }
        if let Some(ms) = parse_millis(&lookup, "CLAUDE_BRIDGE_GRACE_MS")? {
            config.session.stop_grace = ms;
        }
        if let Some(raw) = lookup("CLAUDE_BRIDGE_MAX_LINE_BYTES") {
            config.session.max_line_length = match raw.trim().parse::<usize>() {
                Ok(0) => {
                    return Err(BridgeError::invalid_config(
                        "CLAUDE_BRIDGE_MAX_LINE_BYTES must be positive",
                    ));
                }
                Ok(bytes) => bytes,
                Err(e) => {
                    return Err(BridgeError::invalid_config(format!(
                        "CLAUDE_BRIDGE_MAX_LINE_BYTES '{raw}': {e}"
                    )));
                }
            };
        }
        if let Some(ms) = parse_millis(&lookup, "CLAUDE_BRIDGE_COMMAND_TIMEOUT_MS")? {
            config.executor.command_timeout = ms;
        }
        if let Some(ms) = parse_millis(&lookup, "CLAUDE_BRIDGE_TASK_TIMEOUT_MS")? {
            config.executor.task_timeout = ms;
        }
        if let Some(ms) = parse_millis(&lookup, "CLAUDE_BRIDGE_METRICS_INTERVAL_MS")? {
            if ms.is_zero() {
                return Err(BridgeError::invalid_config(
                    "CLAUDE_BRIDGE_METRICS_INTERVAL_MS must be positive",
                ));
            }
            config.metrics_interval = ms;
        }

        Ok(config)
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| BridgeError::invalid_config(format!("{key} '{raw}': {e}")))
        })
        .transpose()
}

/// Builder for `BridgeConfig`
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Set the listen address
    #[must_use]
    pub const fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    /// Set session options
    #[must_use]
    pub fn session(mut self, session: SessionOptions) -> Self {
        self.config.session = session;
        self
    }

    /// Set executor configuration
    #[must_use]
    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executor = executor;
        self
    }

    /// Set the metrics broadcast interval
    #[must_use]
    pub const fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
