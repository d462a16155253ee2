//! Best-effort host metrics
//!
//! Sampled through the command executor with the same shell pipelines the
//! control panel has always used; anything unparsable becomes `N/A`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{StatusBoard, UNAVAILABLE};
use crate::executor::CommandExecutor;
use crate::types::gateway::SystemStatus;

const MEMORY_COMMAND: &str = r#"free -m 2>/dev/null || echo "Mem: 1024 512 512""#;

const CPU_COMMAND: &str = r#"top -bn1 | grep "Cpu(s)" | sed "s/.*, *\([0-9.]*\)%* id.*/\1/" | awk '{print 100 - $1}' 2>/dev/null || echo "5""#;

const SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);
const SAMPLE_MAX_OUTPUT: usize = 64 * 1024;

/// `used/total MB` from `free -m` output
#[must_use]
pub fn parse_memory(output: &str) -> Option<String> {
    let line = output
        .lines()
        .find(|line| line.trim_start().starts_with("Mem:"))?;
    let mut fields = line.split_whitespace().skip(1);
    let total = fields.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    let used = fields.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    Some(format!("{used}/{total} MB"))
}

/// Rounded busy percentage from the CPU pipeline output
#[must_use]
pub fn parse_cpu(output: &str) -> Option<String> {
    let busy = output.trim().parse::<f64>().ok()?;
    busy.is_finite().then(|| format!("{}%", busy.round()))
}

async fn sample(
    executor: &CommandExecutor,
    command: &str,
    parse: fn(&str) -> Option<String>,
) -> String {
    match executor.run(command, SAMPLE_TIMEOUT, SAMPLE_MAX_OUTPUT).await {
        Ok(output) if !output.timed_out => {
            parse(&output.stdout).unwrap_or_else(|| UNAVAILABLE.to_string())
        }
        Ok(_) => UNAVAILABLE.to_string(),
        Err(e) => {
            log::debug!("metrics sample failed: {e}");
            UNAVAILABLE.to_string()
        }
    }
}

/// Sample `(memory, cpu)`
pub async fn sample_metrics(executor: &CommandExecutor) -> (String, String) {
    let memory = sample(executor, MEMORY_COMMAND, parse_memory).await;
    let cpu = sample(executor, CPU_COMMAND, parse_cpu).await;
    (memory, cpu)
}

/// Refresh `board` every `interval` and hand each snapshot to `publish`
///
/// The first sample is taken one interval after the call.
pub fn spawn_metrics_reporter<F>(
    board: Arc<StatusBoard>,
    executor: CommandExecutor,
    interval: Duration,
    publish: F,
) -> JoinHandle<()>
where
    F: Fn(SystemStatus) + Send + 'static,
{
    tokio::spawn(async move {
        let first = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(first, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let (memory, cpu) = sample_metrics(&executor).await;
            board.record_metrics(memory, cpu);
            publish(board.snapshot());
        }
    })
}
