//! Shared system status
//!
//! One [`StatusBoard`] per server: uptime, the coarse run state of the
//! command service, whether anyone is connected, and the last host metrics
//! sample. Snapshots are what `system_status` events carry.

mod metrics;

pub use metrics::{parse_cpu, parse_memory, sample_metrics, spawn_metrics_reporter};

use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use crate::types::gateway::{RunStatus, SystemStatus};

/// Placeholder for a metric that could not be sampled
pub const UNAVAILABLE: &str = "N/A";

#[derive(Debug)]
struct BoardInner {
    status: RunStatus,
    running_tasks: usize,
    connected: bool,
    memory: String,
    cpu: String,
}

/// Mutable server-wide status
#[derive(Debug)]
pub struct StatusBoard {
    started_at: Instant,
    inner: Mutex<BoardInner>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Board for a server that starts now
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            inner: Mutex::new(BoardInner {
                status: RunStatus::Idle,
                running_tasks: 0,
                connected: false,
                memory: "0 MB".to_string(),
                cpu: "0%".to_string(),
            }),
        }
    }

    /// Current run state
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.inner.lock().status
    }

    /// Replace the run state
    pub fn set_status(&self, status: RunStatus) {
        self.inner.lock().status = status;
    }

    /// Count a task in and mark the service `Running`
    pub fn task_started(&self) {
        let mut inner = self.inner.lock();
        inner.running_tasks += 1;
        inner.status = RunStatus::Running;
    }

    /// Count a task out; the service goes `Idle` when none are left
    pub fn task_finished(&self) {
        let mut inner = self.inner.lock();
        inner.running_tasks = inner.running_tasks.saturating_sub(1);
        if inner.running_tasks == 0 {
            inner.status = RunStatus::Idle;
        }
    }

    /// Record whether at least one client is connected
    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    /// Store the latest host metrics
    pub fn record_metrics(&self, memory: String, cpu: String) {
        let mut inner = self.inner.lock();
        inner.memory = memory;
        inner.cpu = cpu;
    }

    /// Time since the board was created
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Snapshot for the wire
    #[must_use]
    pub fn snapshot(&self) -> SystemStatus {
        let inner = self.inner.lock();
        SystemStatus {
            connected: inner.connected,
            status: inner.status,
            uptime: format_uptime(self.uptime()),
            memory: inner.memory.clone(),
            cpu: inner.cpu.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Human uptime: `Nd Mh`, `Nh Mm` or `Nm`
#[must_use]
pub fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.as_secs() / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days}d {}h", hours % 24)
    } else if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
