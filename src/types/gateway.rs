//! Gateway wire messages
//!
//! Clients and the gateway exchange adjacently tagged JSON records:
//! `{"event": "<name>", "data": {...}}`. Events without a payload omit `data`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::ClassifiedEvent;
use crate::error::Result;

// ============================================================================
// Inbound
// ============================================================================

/// Events a client sends to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Start the connection's CLI session
    StartSession,
    /// Stop the connection's CLI session
    StopSession,
    /// Write a line to the session's stdin
    SendMessage {
        /// Text to send (a newline is appended)
        message: String,
    },
    /// Run an ad-hoc shell command, or a `/system` command
    ExecuteCommand {
        /// Command line
        command: String,
    },
    /// Run a predefined task by id
    ExecuteTask {
        /// Task identifier
        task: String,
    },
    /// Ask for the current system status
    GetStatus,
    /// Ask whether the CLI program is installed
    CheckCli,
    /// Ask the server to shut down so its supervisor restarts it
    Restart,
}

impl InboundEvent {
    /// Decode one wire line
    ///
    /// # Errors
    /// Returns `Json` if the line is not a known event
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Styling hint for terminal output lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Regular output
    Output,
    /// Error output
    Error,
    /// Informational message from the gateway itself
    Info,
}

/// Session status relayed to the chat UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The CLI process is running
    Connected,
    /// No CLI process is running
    Disconnected,
}

/// Coarse activity state of the command service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Nothing running
    Idle,
    /// A task is running
    Running,
    /// Stopped
    Stopped,
    /// Last operation failed
    Error,
}

/// Host status snapshot broadcast to every connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// At least one client is connected
    pub connected: bool,
    /// Activity state
    pub status: RunStatus,
    /// Server uptime, e.g. `3h 12m`
    pub uptime: String,
    /// Memory usage, e.g. `512/1024 MB`
    pub memory: String,
    /// CPU usage, e.g. `5%`
    pub cpu: String,
    /// When this snapshot was taken
    pub timestamp: DateTime<Utc>,
}

/// Events the gateway sends to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A classified line from the session's subprocess
    ClaudeMessage(ClassifiedEvent),
    /// Session status change
    ClaudeStatus {
        /// New status
        status: SessionStatus,
    },
    /// Output of an ad-hoc command, task or system command
    CommandOutput {
        /// Output text
        output: String,
        /// Styling hint
        #[serde(rename = "type")]
        output_type: OutputType,
    },
    /// Task progress notification
    TaskProgress {
        /// Task display name
        task: String,
        /// Percentage, 0..=100
        progress: u8,
    },
    /// Task completion notification
    TaskComplete {
        /// Task display name, or the requested id for unknown tasks
        task: String,
        /// Whether the task ran and exited normally
        success: bool,
    },
    /// Host status snapshot
    SystemStatus(SystemStatus),
    /// Answer to a CLI presence probe
    CliStatus {
        /// Whether the CLI program is on the host
        installed: bool,
    },
}

impl OutboundEvent {
    /// Encode as one wire line, without the terminator
    ///
    /// # Errors
    /// Returns `Json` if the event cannot be serialized
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Convenience constructor for `CommandOutput`
    pub fn output(output: impl Into<String>, output_type: OutputType) -> Self {
        Self::CommandOutput {
            output: output.into(),
            output_type,
        }
    }
}
