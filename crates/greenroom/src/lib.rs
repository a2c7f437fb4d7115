//! # Greenroom
//!
//! Session and command-dispatch engine for a FESL/Theater game backend.
//!
//! The socket layer (not part of this crate) decodes packets and hands
//! them over as [`TcpEvent`](greenroom_transport::TcpEvent)s and
//! [`UdpEvent`](greenroom_transport::UdpEvent)s. A [`TheaterServer`]
//! consumes both channels, keeps one session per connection, routes
//! commands to their handlers and cleans up after disconnects.
//!
//! ```text
//! socket layer ──TcpEvent/UdpEvent──→ dispatch loop ──spawn──→ handler
//!                                          │                    │
//!                                     close (inline)     store / registry / database
//!                                          │                    │
//!                                          ▼                    ▼
//!                                      cleanup            Answer ──→ client outbox
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use greenroom::prelude::*;
//!
//! # async fn start() -> Result<(), GreenroomError> {
//! let config = ServerConfig::load("greenroom.toml")?;
//! greenroom::init_logging("info");
//!
//! let store = Arc::new(MemoryStore::new());
//! let db = SqliteDatabase::connect(&config.database).await?;
//! let authz = StoreAuthorizer::new(Arc::clone(&store));
//!
//! let server = TheaterServerBuilder::new().config(config).build(store, db, authz);
//! // let (tcp_tx, tcp_rx) = tokio::sync::mpsc::channel(1024); ... hand tcp_tx to the socket layer
//! # let (_tcp_tx, tcp_rx) = tokio::sync::mpsc::channel(1);
//! # let (_udp_tx, udp_rx) = tokio::sync::mpsc::channel(1);
//! server.run(tcp_rx, udp_rx).await
//! # }
//! ```

mod audit;
mod config;
mod dispatch;
mod error;
mod handlers;
mod lifecycle;
mod logging;
mod metrics;
mod server;

pub use audit::{AuditError, AuditLog, Direction};
pub use config::{AuditConfig, ConfigError, HeartbeatConfig, MetricsConfig, ServerConfig};
pub use error::GreenroomError;
pub use handlers::MATCHMAKE_PERMISSION;
pub use logging::init_logging;
pub use metrics::{FieldValue, MetricPoint, MetricsError, MetricsReporter, MetricsSink, TracingSink};
pub use server::{TheaterServer, TheaterServerBuilder};

/// Everything needed to wire up a server.
pub mod prelude {
    pub use crate::{
        AuditLog, GreenroomError, MetricsReporter, MetricsSink, ServerConfig, TheaterServer,
        TheaterServerBuilder, TracingSink,
    };
    pub use greenroom_protocol::{Answer, Command, FrameFlag, GameId, Packet, Shard, Team, Verb};
    pub use greenroom_registry::{GameRegistry, GameServer};
    pub use greenroom_session::{
        Authorizer, MemoryStore, SessionConfig, SessionStore, StoreAuthorizer,
    };
    pub use greenroom_stats::{DatabaseConfig, GameDatabase, SqliteDatabase};
    pub use greenroom_transport::{Client, ConnectionId, TcpEvent, UdpEvent, UdpPeer};
}
