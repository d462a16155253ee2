//! Error types for the Claude bridge

use thiserror::Error;

/// Main error type for the Claude bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// `start()` called while the session already owns a live process
    #[error("Session {0} is already running")]
    AlreadyRunning(String),

    /// Operation requires a running process but the session has none
    #[error("Session {0} is not running")]
    NotRunning(String),

    /// The operating system refused to launch the program
    #[error("Failed to launch '{program}': {source}")]
    LaunchError {
        /// Program that was being launched
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// No predefined task with this identifier
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// A process did not exit within its time budget
    #[error("Timeout: {0}")]
    TimedOut(String),

    /// The process could not be terminated cleanly
    #[error("Failed to terminate session {session}: {message}")]
    TerminationError {
        /// Session whose process was being stopped
        session: String,
        /// Description of the failure
        message: String,
    },

    /// The session was removed from its registry and refuses to start again
    #[error("Session {0} has been closed")]
    SessionClosed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed JSON on the gateway wire
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create an already-running error
    pub fn already_running(session: impl Into<String>) -> Self {
        Self::AlreadyRunning(session.into())
    }

    /// Create a not-running error
    pub fn not_running(session: impl Into<String>) -> Self {
        Self::NotRunning(session.into())
    }

    /// Create a launch error wrapping the OS error
    pub fn launch(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::LaunchError {
            program: program.into(),
            source,
        }
    }

    /// Create an unknown task error
    pub fn unknown_task(task_id: impl Into<String>) -> Self {
        Self::UnknownTask(task_id.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TimedOut(msg.into())
    }

    /// Create a termination error
    pub fn termination(session: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TerminationError {
            session: session.into(),
            message: msg.into(),
        }
    }

    /// Create a session closed error
    pub fn session_closed(session: impl Into<String>) -> Self {
        Self::SessionClosed(session.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Short machine-readable label, used when the error is relayed to clients
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::LaunchError { .. } => "launch_error",
            Self::UnknownTask(_) => "unknown_task",
            Self::TimedOut(_) => "timed_out",
            Self::TerminationError { .. } => "termination_error",
            Self::SessionClosed(_) => "session_closed",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
        }
    }
}
