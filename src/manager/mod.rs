//! Process session management
//!
//! # Module Structure
//!
//! - `session` - `ProcessSession` and its state machine
//! - `fanout` - epoch-guarded delivery to subscribers
//! - `commands` - command protocol for supervisor tasks
//! - `background` - output pumps, stdin writer, supervisor

mod background;
mod commands;
mod fanout;
mod session;

pub use fanout::{EventSubscription, Fanout};
pub use session::{ProcessSession, SessionState};
