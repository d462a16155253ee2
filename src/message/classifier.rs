//! Tag-prefix classification of subprocess output lines
//!
//! The CLI's interactive output is unstructured text. Lines that open with a
//! known tag get a specific kind; everything else falls back to a default.
//! This only drives presentation, never control flow.

use std::borrow::Cow;
use std::sync::LazyLock;

use crate::types::events::{ClassifiedEvent, EventKind};

/// Tag that marks model reasoning
pub const THINKING_TAG: &str = "<thinking>";

/// Tag that marks a command the model is running
pub const EXECUTE_TAG: &str = "<execute>";

/// Tag that marks a result
pub const RESULT_TAG: &str = "<result>";

static STANDARD: LazyLock<OutputClassifier> = LazyLock::new(OutputClassifier::standard);

/// A single prefix rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRule {
    /// Prefix the line must start with
    pub tag: Cow<'static, str>,
    /// Kind assigned when the prefix matches
    pub kind: EventKind,
}

impl TagRule {
    /// Create a rule
    pub fn new(tag: impl Into<Cow<'static, str>>, kind: EventKind) -> Self {
        Self {
            tag: tag.into(),
            kind,
        }
    }
}

/// Ordered prefix table plus a fallback kind
///
/// Rules are tried in order; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputClassifier {
    rules: Vec<TagRule>,
    fallback: EventKind,
}

impl OutputClassifier {
    /// Create a classifier from a rule table and fallback kind
    #[must_use]
    pub const fn new(rules: Vec<TagRule>, fallback: EventKind) -> Self {
        Self { rules, fallback }
    }

    /// Table used for the CLI's standard output
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            vec![
                TagRule::new(THINKING_TAG, EventKind::Thinking),
                TagRule::new(EXECUTE_TAG, EventKind::Command),
                TagRule::new(RESULT_TAG, EventKind::Result),
            ],
            EventKind::Result,
        )
    }

    /// Table used for the CLI's standard error: everything is an error
    #[must_use]
    pub const fn diagnostics() -> Self {
        Self::new(Vec::new(), EventKind::Error)
    }

    /// Append a rule, consuming the classifier
    #[must_use]
    pub fn with_rule(mut self, tag: impl Into<Cow<'static, str>>, kind: EventKind) -> Self {
        self.rules.push(TagRule::new(tag, kind));
        self
    }

    /// Kind for a line, without building an event
    #[must_use]
    pub fn kind_of(&self, line: &str) -> EventKind {
        self.rules
            .iter()
            .find(|rule| line.starts_with(rule.tag.as_ref()))
            .map_or(self.fallback, |rule| rule.kind)
    }

    /// Classify a complete line
    #[must_use]
    pub fn classify(&self, line: &str) -> ClassifiedEvent {
        ClassifiedEvent::new(self.kind_of(line), line)
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::standard()
    }
}

/// Classify a line with the standard table
#[must_use]
pub fn classify(line: &str) -> ClassifiedEvent {
    STANDARD.classify(line)
}

/// Whether a line carries no visible content and should be dropped
#[must_use]
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}
