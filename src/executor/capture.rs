//! Capped capture of a command's output streams
//!
//! Both streams draw from one shared byte budget. Captured bytes live in
//! shared buffers so whatever was read before a timeout kill is still
//! available to the caller after the reader tasks are torn down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;

/// Bytes requested per read from a pipe
const READ_CHUNK_SIZE: usize = 8192;

/// Combined stdout+stderr byte budget
#[derive(Debug)]
pub(super) struct OutputBudget {
    remaining: AtomicUsize,
    exhausted: AtomicBool,
    notify: Notify,
}

impl OutputBudget {
    pub(super) fn new(limit: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(limit),
            exhausted: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Reserve up to `wanted` bytes, returning how many were granted
    ///
    /// A short grant marks the budget exhausted.
    pub(super) fn take(&self, wanted: usize) -> usize {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                Some(left.saturating_sub(wanted))
            })
            .unwrap_or(0);
        let granted = previous.min(wanted);
        if granted < wanted {
            self.mark_exhausted();
        }
        granted
    }

    fn mark_exhausted(&self) {
        if !self.exhausted.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    pub(super) fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// Resolves once some stream was cut short
    pub(super) async fn exhausted(&self) {
        if self.is_exhausted() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Bytes captured from one stream
#[derive(Debug, Clone, Default)]
pub(super) struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    fn extend(&self, chunk: &[u8]) {
        self.bytes.lock().extend_from_slice(chunk);
    }

    /// Lossy UTF-8 snapshot of the captured bytes
    pub(super) fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }
}

/// Read `reader` into `buffer` until EOF or the budget runs out
pub(super) async fn read_capped<R>(
    mut reader: R,
    buffer: CaptureBuffer,
    budget: Arc<OutputBudget>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut tmp = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        let granted = budget.take(n);
        buffer.extend(&tmp[..granted]);
        if granted < n {
            return Ok(());
        }
    }
}
