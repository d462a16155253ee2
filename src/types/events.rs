//! Classified subprocess output events
//!
//! Every complete line a session's subprocess writes becomes exactly one
//! [`ClassifiedEvent`]. Events are immutable once produced: the fields are
//! private and only readable through accessors.

use serde::{Deserialize, Serialize};

/// Kind assigned to a line of subprocess output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Model reasoning (`<thinking>` lines)
    Thinking,
    /// A command the model is about to run (`<execute>` lines)
    Command,
    /// Plain output, and the fallback for anything unrecognised
    Result,
    /// Diagnostics, process failures and lifecycle errors
    Error,
}

impl EventKind {
    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Command => "command",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

/// Which pipeline produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Standard output of the subprocess
    Stdout,
    /// Standard error of the subprocess
    Stderr,
    /// The session itself (launch failures, exits, termination errors)
    Session,
}

impl StreamKind {
    /// Wire name of the stream
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Session => "session",
        }
    }
}

/// A typed, line-granular interpretation of subprocess output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(rename = "content")]
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ClassifiedEvent {
    /// Create an event without metadata
    pub fn new(kind: EventKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            metadata: None,
        }
    }

    /// Create an `Error` event attributed to the session itself
    pub fn session_error(text: impl Into<String>) -> Self {
        Self::new(EventKind::Error, text).with_stream(StreamKind::Session)
    }

    /// Attach a metadata entry, consuming the event
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// Record the originating stream under the `stream` metadata key
    #[must_use]
    pub fn with_stream(self, stream: StreamKind) -> Self {
        self.with_metadata("stream", serde_json::Value::from(stream.as_str()))
    }

    /// Event kind
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Line text, exactly as the subprocess produced it
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Optional metadata
    #[must_use]
    pub const fn metadata(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.metadata.as_ref()
    }

    /// Originating stream, if recorded
    #[must_use]
    pub fn stream(&self) -> Option<StreamKind> {
        let value = self.metadata.as_ref()?.get("stream")?;
        serde_json::from_value(value.clone()).ok()
    }
}
