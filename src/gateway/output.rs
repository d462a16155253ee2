//! Mapping of executor results to `command_output` events

use std::time::Duration;

use crate::executor::CommandOutput;
use crate::types::gateway::{OutboundEvent, OutputType};

const SUCCESS_MESSAGE: &str = "Command executed successfully";

fn captured(output: &CommandOutput) -> Vec<OutboundEvent> {
    let mut events = Vec::with_capacity(3);
    if !output.stdout.is_empty() {
        events.push(OutboundEvent::output(&output.stdout, OutputType::Output));
    }
    if !output.stderr.is_empty() {
        events.push(OutboundEvent::output(&output.stderr, OutputType::Error));
    }
    if output.truncated {
        events.push(OutboundEvent::output(
            "Output limit reached, remaining output discarded",
            OutputType::Info,
        ));
    }
    events
}

/// Events for an ad-hoc command result
pub(super) fn command_events(
    command: &str,
    output: &CommandOutput,
    limit: Duration,
) -> Vec<OutboundEvent> {
    let mut events = captured(output);
    if output.timed_out {
        events.push(OutboundEvent::output(
            format!("Command timed out ({}s limit)", limit.as_secs()),
            OutputType::Error,
        ));
    } else if !output.exited_normally && !output.truncated {
        events.push(OutboundEvent::output(
            format!("Command failed: {command}"),
            OutputType::Error,
        ));
    } else if events.is_empty() {
        events.push(OutboundEvent::output(SUCCESS_MESSAGE, OutputType::Output));
    }
    events
}

/// Events for a task result, and whether the task succeeded
pub(super) fn task_events(output: &CommandOutput, limit: Duration) -> (Vec<OutboundEvent>, bool) {
    let mut events = captured(output);
    if output.timed_out {
        events.push(OutboundEvent::output(
            format!("Task timed out ({}s limit)", limit.as_secs()),
            OutputType::Error,
        ));
    }
    (events, output.exited_normally)
}
