//! Subprocess spawn capability built on `tokio::process`

mod command;
mod lifecycle;
mod transport;

// Re-export public types
pub use command::CommandBuilder;
pub use transport::{SubprocessHandle, SubprocessSpawner};
