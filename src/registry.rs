//! Session registry with connection isolation
//!
//! Each client connection owns at most one [`ProcessSession`]. The registry
//! creates it lazily and guarantees it is stopped when the connection goes away.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::manager::ProcessSession;
use crate::transport::{Spawner, SubprocessSpawner};
use crate::types::identifiers::{ConnectionId, SessionId};
use crate::types::options::SessionOptions;

type SessionMap = HashMap<ConnectionId, Arc<ProcessSession>>;

/// Maps connection ids to their sessions
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
    options: SessionOptions,
    spawner: Arc<dyn Spawner>,
}

impl SessionRegistry {
    /// Create a registry whose sessions spawn with `options`
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self::with_spawner(options, Arc::new(SubprocessSpawner::new()))
    }

    /// Create a registry with a custom spawn capability
    #[must_use]
    pub fn with_spawner(options: SessionOptions, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            options,
            spawner,
        }
    }

    /// Session for `connection_id`, created `Idle` if absent
    ///
    /// Concurrent callers for the same id get the same session.
    pub async fn get_or_create(&self, connection_id: &ConnectionId) -> Arc<ProcessSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(connection_id.clone()).or_insert_with(|| {
            log::debug!("Creating session for connection {connection_id}");
            Arc::new(ProcessSession::with_spawner(
                SessionId::from(connection_id),
                self.options.clone(),
                Arc::clone(&self.spawner),
            ))
        });
        Arc::clone(session)
    }

    /// Session for `connection_id`, if one exists
    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Arc<ProcessSession>> {
        self.sessions.lock().await.get(connection_id).cloned()
    }

    /// Stop and forget the session for `connection_id`
    ///
    /// The entry is taken out under the lock and then closed, so a concurrent
    /// `start()` on a stale handle fails with `SessionClosed` instead of leaving
    /// an orphan process. Returns whether a session existed.
    ///
    /// # Errors
    /// Propagates the `TerminationError` from stopping the session; the entry
    /// is removed either way
    pub async fn remove(&self, connection_id: &ConnectionId) -> Result<bool> {
        let removed = self.sessions.lock().await.remove(connection_id);
        let Some(session) = removed else {
            return Ok(false);
        };
        log::debug!("Removing session for connection {connection_id}");
        session.close().await?;
        Ok(true)
    }

    /// Number of tracked sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no sessions are tracked
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Close every session; returns how many were removed
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(ConnectionId, Arc<ProcessSession>)> =
            self.sessions.lock().await.drain().collect();
        let count = drained.len();

        let closes = drained.into_iter().map(|(connection_id, session)| async move {
            if let Err(e) = session.close().await {
                log::warn!("Failed to stop session for connection {connection_id}: {e}");
            }
        });
        futures::future::join_all(closes).await;

        count
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("program", &self.options.program)
            .finish_non_exhaustive()
    }
}
