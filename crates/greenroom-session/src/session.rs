//! Session types: the server's record of one live client connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to (the shared [`Client`] handle)
//! - WHERE it is in its lifecycle ([`SessionState`])
//! - WHETHER the client finished logging in
//! - WHICH session-store record holds its fields

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use greenroom_tick::TickConfig;
use greenroom_transport::{Client, ConnectionId};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between liveness probes. Default: 15 seconds.
    pub heartbeat_interval: Duration,
    /// Random delay (upper bound) added before a session's first probe.
    pub heartbeat_jitter: Duration,
    /// Prefix of the session-store key of every client record
    /// (`<prefix>:<connection id>`).
    pub key_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_jitter: Duration::ZERO,
            key_prefix: "session".to_string(),
        }
    }
}

impl SessionConfig {
    /// Ticker settings for the heartbeat task.
    pub fn heartbeat_ticks(&self) -> TickConfig {
        TickConfig {
            initial_jitter: self.heartbeat_jitter,
            ..TickConfig::every(self.heartbeat_interval)
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of a client session.
///
/// ```text
///   Connecting ──(newClient)──→ Active ──(client.close)──→ Closing ──(cleanup)──→ Closed
///        │                                                   ↑
///        └───────────────(closed before activation)──────────┘
/// ```
///
/// `Closed` is terminal: nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    /// Whether `self → to` is a legal transition.
    pub fn can_become(self, to: SessionState) -> bool {
        matches!(
            (self, to),
            (SessionState::Connecting, SessionState::Active)
                | (SessionState::Connecting, SessionState::Closing)
                | (SessionState::Active, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        )
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => SessionState::Connecting,
            1 => SessionState::Active,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// One client's session.
///
/// Shared as `Arc<ClientSession>`: the session table owns one reference,
/// each in-flight handler and the heartbeat task hold others. State and
/// login flag are atomics so handlers can check them without taking the
/// session table lock.
#[derive(Debug)]
pub struct ClientSession {
    client: Arc<Client>,
    store_key: String,
    state: AtomicU8,
    logged_in: AtomicBool,
}

impl ClientSession {
    /// Creates a session in the `Connecting` state.
    pub fn new(client: Arc<Client>, config: &SessionConfig) -> Self {
        let store_key = format!("{}:{}", config.key_prefix, client.id().into_inner());
        Self {
            client,
            store_key,
            state: AtomicU8::new(SessionState::Connecting as u8),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn id(&self) -> ConnectionId {
        self.client.id()
    }

    /// Key of this client's session-store record.
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// `true` while the session is `Active` and the connection is up.
    /// Handlers bail out early when this is `false`.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active && self.client.is_active()
    }

    /// Whether the client completed login on this connection.
    pub fn has_login(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    pub fn mark_logged_in(&self) {
        self.logged_in.store(true, Ordering::Release);
    }

    /// Moves the session to `to`, returning the previous state.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] if the move is not allowed from
    /// the current state. The state is left unchanged.
    pub fn transition(&self, to: SessionState) -> Result<SessionState, SessionError> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                SessionState::from_raw(raw)
                    .can_become(to)
                    .then_some(to as u8)
            })
            .map(SessionState::from_raw)
            .map_err(|raw| SessionError::InvalidTransition {
                from: SessionState::from_raw(raw),
                to,
            })
    }
}
