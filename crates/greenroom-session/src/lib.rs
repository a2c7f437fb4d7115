//! Client session management for greenroom.
//!
//! This crate handles the lifecycle of a client connection:
//!
//! 1. **Session tracking**: which connections are live ([`SessionManager`])
//!    and where each one is in its lifecycle ([`SessionState`]).
//! 2. **Heartbeat**: a per-session liveness probe ([`spawn_heartbeat`]).
//! 3. **Session store**: the distributed key/value record kept per client
//!    ([`SessionStore`], with an in-process [`MemoryStore`]).
//! 4. **Authorization**: permission checks for commands that need them
//!    ([`Authorizer`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)  ← opens/closes sessions, hands them to handlers
//!     ↕
//! Session Layer (this crate)  ← per-client state, store, permissions
//!     ↕
//! Transport (below)  ← Client handles with a liveness flag
//! ```

#![allow(async_fn_in_trait)]

mod authz;
mod error;
mod heartbeat;
mod manager;
mod session;
mod store;

pub use authz::{Authorizer, StoreAuthorizer};
pub use error::{SessionError, StoreError};
pub use heartbeat::{PING_QUERY, spawn_heartbeat};
pub use manager::SessionManager;
pub use session::{ClientSession, SessionConfig, SessionState};
pub use store::{MemoryStore, SessionStore, fields, keys};
