//! Type definitions for the Claude bridge
//!
//! - [`identifiers`] - Type-safe ID wrappers (`ConnectionId`, `SessionId`)
//! - [`events`] - Classified subprocess output events
//! - [`tasks`] - Predefined task definitions
//! - [`options`] - Session, executor and server configuration
//! - [`gateway`] - Client/gateway wire messages

pub mod events;
pub mod gateway;
pub mod identifiers;
pub mod options;
pub mod tasks;

// Re-export commonly used types
pub use events::{ClassifiedEvent, EventKind, StreamKind};
pub use gateway::{
    InboundEvent, OutboundEvent, OutputType, RunStatus, SessionStatus, SystemStatus,
};
pub use identifiers::{ConnectionId, SessionId};
pub use options::{BridgeConfig, ExecutorConfig, SessionOptions};
pub use tasks::TaskSpec;
