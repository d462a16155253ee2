//! Turning raw subprocess output into classified events
//!
//! Output flows through two stages: [`framer`] cuts the byte stream into
//! complete lines, [`classifier`] assigns each non-blank line a kind.

pub mod classifier;
pub mod framer;

pub use classifier::{OutputClassifier, TagRule, classify, is_blank};
pub use framer::{FramedLines, LineFramer};
