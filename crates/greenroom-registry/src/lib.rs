//! Registry of joinable game servers for greenroom.
//!
//! A game server advertises itself with `CGAM`; from then on it is listed in
//! the [`GameRegistry`] until its owning connection closes. Matchmaking
//! queries pick from the registry, join and leave commands update its
//! player counts, and game listings read from it.
//!
//! The registry is shared by every handler task, so all access goes
//! through an internal lock. It is constructed once and injected into the
//! components that need it.

mod error;
mod game;
mod registry;

pub use error::RegistryError;
pub use game::{GameEntry, GameServer};
pub use registry::GameRegistry;
