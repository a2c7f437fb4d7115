//! Error types for the session layer.

use greenroom_transport::ConnectionId;

use crate::SessionState;

/// Errors raised by the session store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the call.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A field expected to hold a number held something else.
    #[error("field {field} of {key} is not a number: {value:?}")]
    NotANumber {
        key: String,
        field: String,
        value: String,
    },
}

/// Errors that can occur while managing client sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the connection.
    #[error("session not found for {0}")]
    NotFound(ConnectionId),

    /// The connection already has a session that has not been closed.
    /// Reuse of a connection identity is only allowed after cleanup.
    #[error("{0} already has an open session")]
    AlreadyOpen(ConnectionId),

    /// The requested lifecycle transition is not allowed.
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    /// A session-store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
