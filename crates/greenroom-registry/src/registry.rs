//! The game registry: game id → advertised game and owning connection.
//!
//! # Concurrency
//!
//! Handlers for different clients run as independent tasks and all of them
//! may touch the registry, so the table sits behind a `tokio::sync::RwLock`.
//! Every method takes the lock for the duration of a single map operation;
//! no lock is ever held across another await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use greenroom_protocol::GameId;
use greenroom_transport::Client;
use tokio::sync::RwLock;

use crate::{GameEntry, GameServer, RegistryError};

/// Directory of currently advertised games.
///
/// ```text
/// CGAM ──→ insert() ──→ [listed] ──→ update() (UGAM, EGAM, PENT, PLVT)
///                           │
///                           ▼
///               remove() on owner disconnect
/// ```
#[derive(Debug, Default)]
pub struct GameRegistry {
    games: RwLock<HashMap<GameId, GameEntry>>,
    /// Number of matchmaking lookups served, for metrics and tests.
    lookups: AtomicU64,
}

impl GameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a game advertised by `owner`.
    ///
    /// # Errors
    /// [`RegistryError::AlreadyRegistered`] if the id is taken. The existing
    /// entry is left untouched.
    pub async fn insert(&self, server: GameServer, owner: Arc<Client>) -> Result<(), RegistryError> {
        let gid = server.gid;
        let mut games = self.games.write().await;
        if games.contains_key(&gid) {
            return Err(RegistryError::AlreadyRegistered(gid));
        }
        games.insert(gid, GameEntry { server, owner });
        tracing::info!(%gid, total = games.len(), "game registered");
        Ok(())
    }

    /// Removes a game. Returns the entry if it was registered.
    pub async fn remove(&self, gid: GameId) -> Option<GameEntry> {
        let mut games = self.games.write().await;
        let removed = games.remove(&gid);
        if removed.is_some() {
            tracing::info!(%gid, total = games.len(), "game unregistered");
        }
        removed
    }

    /// Returns a snapshot of a game's advertised state.
    pub async fn get(&self, gid: GameId) -> Option<GameServer> {
        self.games
            .read()
            .await
            .get(&gid)
            .map(|entry| entry.server.clone())
    }

    /// Returns the connection that owns a game.
    pub async fn owner(&self, gid: GameId) -> Option<Arc<Client>> {
        self.games
            .read()
            .await
            .get(&gid)
            .map(|entry| Arc::clone(&entry.owner))
    }

    /// Whether a game is registered.
    pub async fn contains(&self, gid: GameId) -> bool {
        self.games.read().await.contains_key(&gid)
    }

    /// Applies `f` to a registered game under the write lock.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if the game is not registered.
    pub async fn update<F, R>(&self, gid: GameId, f: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut GameServer) -> R,
    {
        let mut games = self.games.write().await;
        let entry = games.get_mut(&gid).ok_or(RegistryError::NotFound(gid))?;
        Ok(f(&mut entry.server))
    }

    /// Returns *some* registered game id, or `None` when nothing is listed.
    ///
    /// No ordering, fitness or capacity criterion is applied; callers must
    /// not rely on which id comes back.
    pub async fn find_any(&self) -> Option<GameId> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let gid = self.games.read().await.keys().next().copied();
        tracing::debug!(gid = ?gid, "matchmaking lookup");
        gid
    }

    /// Snapshot of every listed game, ordered by id.
    pub async fn list(&self) -> Vec<GameServer> {
        let mut servers: Vec<GameServer> = self
            .games
            .read()
            .await
            .values()
            .map(|entry| entry.server.clone())
            .collect();
        servers.sort_by_key(|server| server.gid);
        servers
    }

    /// Number of listed games.
    pub async fn len(&self) -> usize {
        self.games.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.games.read().await.is_empty()
    }

    /// How many times [`find_any`](Self::find_any) has been called.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}
