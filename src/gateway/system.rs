//! `/`-prefixed system commands typed into the terminal

use std::fmt::Write as _;

use crate::types::tasks::TaskSpec;

/// A parsed system command
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum SystemCommand {
    Status,
    Help,
    Clear,
    Restart,
    Unknown(String),
}

impl SystemCommand {
    /// Parse the first word of `line`, case-insensitively
    pub(super) fn parse(line: &str) -> Self {
        let name = line.split_whitespace().next().unwrap_or_default().to_lowercase();
        match name.as_str() {
            "/status" => Self::Status,
            "/help" => Self::Help,
            "/clear" => Self::Clear,
            "/restart" => Self::Restart,
            _ => Self::Unknown(name),
        }
    }
}

/// Help listing for system commands and the task catalog
pub(super) fn help_text(tasks: &[TaskSpec]) -> String {
    let mut help = String::from(
        "Available System Commands:\n  \
         /status     - Get current system status\n  \
         /help       - Show this help message\n  \
         /clear      - Clear terminal (handled by client)\n  \
         /restart    - Restart the server\n\n\
         Available Tasks:",
    );
    for task in tasks {
        let _ = write!(help, "\n  - {}: {}", task.display_name, task.description);
    }
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(SystemCommand::parse("/status"), SystemCommand::Status);
        assert_eq!(SystemCommand::parse("/HELP me"), SystemCommand::Help);
        assert_eq!(SystemCommand::parse("/clear"), SystemCommand::Clear);
        assert_eq!(SystemCommand::parse("/restart now"), SystemCommand::Restart);
        assert_eq!(
            SystemCommand::parse("/reboot"),
            SystemCommand::Unknown("/reboot".to_string())
        );
    }

    #[test]
    fn help_lists_tasks() {
        let help = help_text(&TaskSpec::defaults());
        assert!(help.starts_with("Available System Commands:"));
        assert!(help.contains("/restart    - Restart the server"));
        assert!(help.contains("- Deploy: Deploy the application"));
    }
}
