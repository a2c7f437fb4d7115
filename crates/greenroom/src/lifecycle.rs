//! Session open and disconnect cleanup.
//!
//! Cleanup spans three stores that share no transaction: the in-memory
//! registry, the session store and the relational database. Every step runs
//! regardless of whether the previous one failed; failures are logged with
//! enough context to repair the leftovers by hand.

use std::sync::Arc;

use greenroom_protocol::GameId;
use greenroom_session::{
    Authorizer, ClientSession, SessionStore, fields, keys, spawn_heartbeat,
};
use greenroom_stats::GameDatabase;
use greenroom_transport::Client;

use crate::server::ServerState;

/// Opens the session of a new connection and starts its heartbeat.
pub(crate) async fn open<S, D, A>(state: &ServerState<S, D, A>, client: Arc<Client>)
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    let conn = client.id();
    if !client.is_active() {
        tracing::info!(%conn, "client left before its session opened");
        return;
    }

    let (session, ticks) = {
        let mut sessions = state.sessions.lock().await;
        match sessions.open(client) {
            Ok(session) => (session, sessions.config().heartbeat_ticks()),
            Err(e) => {
                tracing::warn!(%conn, error = %e, "session not opened");
                return;
            }
        }
    };

    spawn_heartbeat(session, ticks);
    tracing::info!(%conn, "client connected");
}

/// Closes a connection's session: `Active → Closing`, cleanup, `Closed`.
pub(crate) async fn close<S, D, A>(state: &ServerState<S, D, A>, client: &Arc<Client>)
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    let conn = client.id();
    client.mark_inactive();

    let session = match state.sessions.lock().await.begin_close(conn) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!(%conn, error = %e, "close without an open session");
            return;
        }
    };

    cleanup(state, &session).await;

    state.sessions.lock().await.finish_close(conn);
}

async fn cleanup<S, D, A>(state: &ServerState<S, D, A>, session: &ClientSession)
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    let conn = session.id();
    let key = session.store_key();

    match state.store.get(key, fields::GAME_ID).await {
        Ok(Some(raw)) if !raw.is_empty() => match raw.parse::<GameId>() {
            Ok(gid) => release_game(state, gid).await,
            Err(e) => tracing::error!(%conn, value = %raw, error = %e, "session holds an invalid game id"),
        },
        Ok(_) => {}
        Err(e) => tracing::error!(%conn, error = %e, "failed to read game id of closing session"),
    }

    if let Err(e) = state.store.delete(key).await {
        tracing::error!(%conn, key, error = %e, "failed to delete session record");
    }

    if !session.has_login() {
        tracing::debug!(%conn, "session closed before login");
    }
}

/// Removes every trace of a game whose owner disconnected.
pub(crate) async fn release_game<S, D, A>(state: &ServerState<S, D, A>, gid: GameId)
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    if let Err(e) = state.db.delete_game_stats(gid).await {
        tracing::error!(%gid, error = %e, "failed deleting game stats");
    }

    match state.db.delete_game(gid, &state.shard).await {
        Ok(rows) => tracing::debug!(%gid, shard = %state.shard, rows, "game row deleted"),
        Err(e) => {
            tracing::error!(%gid, shard = %state.shard, error = %e, "failed deleting game row");
        }
    }

    if state.registry.remove(gid).await.is_none() {
        tracing::debug!(%gid, "game was not in the registry");
    }

    if let Err(e) = state.store.delete(&keys::game(gid)).await {
        tracing::error!(%gid, error = %e, "failed deleting cached game");
    }

    tracing::info!(%gid, "game released");
}
