//! # Claude Bridge
//!
//! Runs the Claude CLI (or any line-oriented interactive program) as a
//! long-lived subprocess per client connection, and one-shot shell commands
//! with hard limits, streaming everything they print to socket clients as
//! typed events.
//!
//! ## Data flow
//!
//! ```text
//! client ─▶ EventGateway ─▶ ProcessSession::send ─▶ subprocess stdin
//!                        └▶ CommandExecutor::run ─▶ sh -c
//! subprocess stdout/stderr ─▶ LineFramer ─▶ OutputClassifier ─▶ ClassifiedEvent ─▶ subscribers
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use claude_bridge::{ProcessSession, SessionId, SessionOptions};
//!
//! # async fn example() -> claude_bridge::Result<()> {
//! let options = SessionOptions::builder()
//!     .program("cat")
//!     .args(Vec::<String>::new())
//!     .build();
//! let session = ProcessSession::new(SessionId::new("demo"), options);
//! let mut events = session.subscribe();
//!
//! session.start().await?;
//! session.send("<thinking> hello")?;
//! if let Some(event) = events.recv().await {
//!     log::info!("{:?}: {}", event.kind(), event.text());
//! }
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`message`]: line framing and tag classification
//! - [`transport`]: spawn capability and process handles
//! - [`manager`]: process sessions, their state machine and event fan-out
//! - [`registry`]: one session per client connection
//! - [`executor`]: one-shot commands with timeout and output cap
//! - [`gateway`]: client event routing and the TCP transport
//! - [`status`]: uptime and host metrics
//! - [`probe`]: CLI presence check
//! - [`types`]: identifiers, events, wire messages and configuration
//! - [`error`]: error types
//!
//! ## Error Handling
//!
//! Library operations return [`Result<T, BridgeError>`](Result). A command
//! timeout is not an error; it is reported through
//! [`CommandOutput::timed_out`](executor::CommandOutput::timed_out).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod gateway;
pub mod manager;
pub mod message;
pub mod probe;
pub mod registry;
pub mod status;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use error::{BridgeError, Result};
pub use executor::{CommandExecutor, CommandOutput};
pub use gateway::EventGateway;
pub use gateway::server::{ServerHandle, start_server, start_server_with_listener};
pub use manager::{EventSubscription, ProcessSession, SessionState};
pub use message::{LineFramer, OutputClassifier, classify};
pub use registry::SessionRegistry;
pub use transport::{
    ExitReport, ProcessHandle, SpawnSpec, SpawnedProcess, Spawner, SubprocessSpawner,
};

pub use types::events::{ClassifiedEvent, EventKind, StreamKind};
pub use types::gateway::{
    InboundEvent, OutboundEvent, OutputType, RunStatus, SessionStatus, SystemStatus,
};
pub use types::identifiers::{ConnectionId, SessionId};
pub use types::options::{
    BridgeConfig, BridgeConfigBuilder, ExecutorConfig, SessionOptions, SessionOptionsBuilder,
};
pub use types::tasks::TaskSpec;

/// Version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
