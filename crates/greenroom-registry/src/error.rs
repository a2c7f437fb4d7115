//! Error types for the game registry.

use greenroom_protocol::GameId;

/// Errors that can occur when working with the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No game is registered under this id.
    #[error("game {0} not registered")]
    NotFound(GameId),

    /// A game with this id is already registered. Ids come from a shared
    /// counter, so this points at a counter reset or a duplicate `CGAM`.
    #[error("game {0} already registered")]
    AlreadyRegistered(GameId),
}
