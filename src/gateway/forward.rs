//! Relay of one session's output to one connection

use tokio::task::JoinHandle;

use super::OutboundSender;
use crate::manager::{ProcessSession, SessionState};
use crate::types::gateway::{OutboundEvent, SessionStatus};

fn status_of(state: SessionState) -> SessionStatus {
    match state {
        SessionState::Running => SessionStatus::Connected,
        _ => SessionStatus::Disconnected,
    }
}

/// Forward classified events as `claude_message` and state changes as
/// `claude_status` until the connection goes away
pub(super) fn spawn_forwarder(session: &ProcessSession, tx: OutboundSender) -> JoinHandle<()> {
    let mut events = session.subscribe();
    let mut state = session.watch_state();
    let session_id = session.id().clone();
    // Taken before the task runs, so a start racing the spawn is still seen
    let mut last = status_of(*state.borrow_and_update());

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if tx.send(OutboundEvent::ClaudeMessage(event)).is_err() {
                        break;
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = status_of(*state.borrow_and_update());
                    if status != last {
                        last = status;
                        if tx.send(OutboundEvent::ClaudeStatus { status }).is_err() {
                            break;
                        }
                    }
                }
            }
        }
        log::debug!("[{session_id}] forwarder finished");
    })
}
