//! Command and answer model for greenroom.
//!
//! The socket layer (outside this workspace) owns byte-level framing. By the
//! time anything reaches greenroom it has already been decoded into a
//! [`Command`]: a query name such as `CGAM` plus a flat map of string fields.
//! Handlers reply with an [`Answer`], an *ordered* map of dotted field paths
//! (`props.{games}.0.gid`) to string values, which travels back down together
//! with a [`FrameFlag`] the socket layer uses to pick its framing mode.
//!
//! ```text
//! socket layer ── Command ──→ dispatcher ──→ handler
//!      ↑                                        │
//!      └──────── Packet { query, Answer, FrameFlag } ┘
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Answer, Command, FrameFlag, GameId, Packet, Shard, Team, Verb,
};
