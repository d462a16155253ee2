//! Background tasks for a running session
//!
//! Each process run gets three kinds of task:
//! - one output pump per readable stream (read → frame → classify → fan out)
//! - a stdin writer fed by an unbounded channel (fire-and-forget sends)
//! - a supervisor that owns the process handle and reports its exit

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::commands::SupervisorCommand;
use super::session::SessionShared;
use crate::message::{LineFramer, OutputClassifier, is_blank};
use crate::transport::{ProcessHandle, terminate_with_grace};
use crate::types::events::{ClassifiedEvent, EventKind, StreamKind};

/// Bytes requested per read from a pipe
const READ_CHUNK_SIZE: usize = 8192;

/// Spawn the pipeline for one output stream
///
/// Runs until EOF, a read error, or the session's epoch moves on. The
/// trailing unterminated fragment is flushed as a final line at EOF. Lines
/// longer than `max_line_length` are forwarded in pieces, each batch of
/// splits followed by one `Error` event.
pub(super) fn spawn_output_pump<R>(
    mut reader: R,
    stream: StreamKind,
    classifier: OutputClassifier,
    max_line_length: usize,
    shared: Arc<SessionShared>,
    epoch: u64,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framer = LineFramer::with_max_line_length(max_line_length);
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in framer.feed(&buf[..n]) {
                        if !deliver(&shared, epoch, stream, &classifier, &line) {
                            return;
                        }
                    }
                    if framer.take_splits() > 0 && !report_split(&shared, epoch, stream, &framer) {
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("[{}] {} read error: {}", shared.id, stream.as_str(), e);
                    break;
                }
            }
        }

        if let Some(line) = framer.flush() {
            deliver(&shared, epoch, stream, &classifier, &line);
        }
        log::debug!("[{}] {} closed", shared.id, stream.as_str());
    })
}

/// Classify one line and publish it; `false` once the epoch is stale
fn deliver(
    shared: &SessionShared,
    epoch: u64,
    stream: StreamKind,
    classifier: &OutputClassifier,
    line: &str,
) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if is_blank(line) {
        return true;
    }
    let event = classifier.classify(line).with_stream(stream);
    shared.fanout.publish_for(epoch, event)
}

/// Tell subscribers an overlong line was split; `false` once the epoch is stale
fn report_split(shared: &SessionShared, epoch: u64, stream: StreamKind, framer: &LineFramer) -> bool {
    let limit = framer.max_line_length().unwrap_or_default();
    log::warn!("[{}] {} line exceeded {limit} bytes", shared.id, stream.as_str());
    let event = ClassifiedEvent::new(
        EventKind::Error,
        format!("Output line exceeded {limit} bytes and was split"),
    )
    .with_stream(stream);
    shared.fanout.publish_for(epoch, event)
}

/// Spawn the stdin writer
///
/// Writes are not acknowledged: a failed write is logged and ends the writer,
/// after which further sends are rejected as `NotRunning`.
pub(super) fn spawn_stdin_writer<W>(
    mut stdin: W,
    mut input_rx: mpsc::UnboundedReceiver<String>,
    session_id: String,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(text) = input_rx.recv().await {
            let written = async {
                stdin.write_all(text.as_bytes()).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                log::warn!("[{session_id}] stdin write failed: {e}");
                break;
            }
        }
    })
}

/// Spawn the supervisor that owns the process handle
///
/// Either the process exits on its own (reported to the session), or a
/// `Terminate` command arrives and the supervisor stops it. If the command
/// channel closes the process is killed.
pub(super) fn spawn_supervisor(
    mut handle: Box<dyn ProcessHandle>,
    mut command_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
    shared: Arc<SessionShared>,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = handle.wait() => {
                shared.on_process_exit(epoch, result);
            }
            cmd = command_rx.recv() => match cmd {
                Some(SupervisorCommand::Terminate { grace, response_tx }) => {
                    let result = terminate_with_grace(handle.as_mut(), grace).await;
                    let _ = response_tx.send(result);
                }
                None => {
                    log::debug!("[{}] session dropped, killing process", shared.id);
                    let _ = handle.kill();
                    let _ = handle.wait().await;
                }
            },
        }
    })
}
