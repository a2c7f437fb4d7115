//! The session manager: the table of live client sessions.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap` and is not thread-safe by itself.
//! The server wraps it in a `tokio::sync::Mutex`. Open and close both run
//! inline in the dispatch loop, so the lock is held only for map
//! operations and never across a store or database call.

use std::collections::HashMap;
use std::sync::Arc;

use greenroom_transport::{Client, ConnectionId};

use crate::{ClientSession, SessionConfig, SessionError, SessionState};

/// Tracks every open client session, keyed by connection id.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ [Active] ──→ begin_close() ──→ [Closing] ──→ finish_close() ──→ [Closed, removed]
/// ```
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Arc<ClientSession>>,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates an empty manager.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Opens and activates a session for a newly accepted connection.
    ///
    /// # Errors
    /// [`SessionError::AlreadyOpen`] if the connection id still has a
    /// session that has not finished closing.
    pub fn open(&mut self, client: Arc<Client>) -> Result<Arc<ClientSession>, SessionError> {
        let id = client.id();
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyOpen(id));
        }

        let session = Arc::new(ClientSession::new(client, &self.config));
        session.transition(SessionState::Active)?;
        self.sessions.insert(id, Arc::clone(&session));

        tracing::info!(conn = %id, key = session.store_key(), "session opened");
        Ok(session)
    }

    /// Looks up an open session.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ClientSession>> {
        self.sessions.get(&id).cloned()
    }

    /// Moves a session to `Closing`. It stays in the table until
    /// [`finish_close`](Self::finish_close), so a reconnect with the same id
    /// is rejected while cleanup is still running.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if no session exists for `id`
    /// - [`SessionError::InvalidTransition`] if it is already closing
    pub fn begin_close(&mut self, id: ConnectionId) -> Result<Arc<ClientSession>, SessionError> {
        let session = self
            .sessions
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))?;
        session.transition(SessionState::Closing)?;
        tracing::debug!(conn = %id, "session closing");
        Ok(session)
    }

    /// Removes a closing session and marks it `Closed`.
    ///
    /// Returns the session, or `None` if it was not in the table.
    pub fn finish_close(&mut self, id: ConnectionId) -> Option<Arc<ClientSession>> {
        let session = self.sessions.remove(&id)?;
        if let Err(e) = session.transition(SessionState::Closed) {
            tracing::warn!(conn = %id, error = %e, "session removed outside of closing state");
        }
        tracing::info!(conn = %id, "session closed");
        Some(session)
    }

    /// Number of sessions in the table (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
