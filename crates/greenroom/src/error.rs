//! Unified error type for the greenroom engine.

use greenroom_protocol::ProtocolError;
use greenroom_registry::RegistryError;
use greenroom_session::{SessionError, StoreError};
use greenroom_stats::StatsError;
use greenroom_transport::TransportError;

use crate::{AuditError, ConfigError, MetricsError};

/// Top-level error that wraps all crate-specific errors.
///
/// Handlers return this so that `?` works across the store, registry,
/// database and transport calls they mix. The dispatcher logs whatever a
/// handler returns; nothing here ever reaches the client.
#[derive(Debug, thiserror::Error)]
pub enum GreenroomError {
    /// A command field could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Writing to a client or datagram peer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A session lifecycle or authorization error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A session-store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A registry lookup or update failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A relational statement failed.
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A metrics sink rejected a batch.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Reading back an audit record failed.
    #[error(transparent)]
    Audit(#[from] AuditError),
}
