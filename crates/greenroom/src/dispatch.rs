//! The dispatch loop.
//!
//! One loop reads both event channels. Connection opens and closes are
//! handled inline, so a close is fully cleaned up before the next event for
//! a reused connection id is looked at. Everything else is spawned and runs
//! concurrently with later events, including later events of the same
//! client.

use std::sync::Arc;

use greenroom_protocol::Verb;
use greenroom_session::{Authorizer, SessionStore};
use greenroom_stats::GameDatabase;
use greenroom_transport::{TcpEvent, UdpEvent};
use tokio::sync::mpsc;

use crate::lifecycle;
use crate::server::ServerState;

/// Runs until both channels are closed.
pub(crate) async fn run<S, D, A>(
    state: Arc<ServerState<S, D, A>>,
    mut tcp: mpsc::Receiver<TcpEvent>,
    mut udp: mpsc::Receiver<UdpEvent>,
) where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    let mut tcp_open = true;
    let mut udp_open = true;

    while tcp_open || udp_open {
        tokio::select! {
            event = udp.recv(), if udp_open => match event {
                Some(event) => on_udp_event(&state, event).await,
                None => {
                    tracing::debug!("udp event channel closed");
                    udp_open = false;
                }
            },
            event = tcp.recv(), if tcp_open => match event {
                Some(event) => on_tcp_event(&state, event).await,
                None => {
                    tracing::debug!("tcp event channel closed");
                    tcp_open = false;
                }
            },
        }
    }
}

async fn on_tcp_event<S, D, A>(state: &Arc<ServerState<S, D, A>>, event: TcpEvent)
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    let name = event.name();
    match event {
        TcpEvent::NewClient(client) => lifecycle::open(state, client).await,

        TcpEvent::Command { client, command } => {
            let conn = client.id();
            let verb = match Verb::of(&command) {
                Some(Verb::Echo) | None => {
                    state.audit.request(&command).await;
                    tracing::debug!(%conn, event = %name, query = %command.query, txn = command.txn(), "unhandled command");
                    return;
                }
                Some(verb) => verb,
            };

            let Some(session) = state.sessions.lock().await.get(conn) else {
                tracing::debug!(%conn, %verb, "command for unknown session dropped");
                return;
            };

            let state = Arc::clone(state);
            tokio::spawn(async move {
                state.handle_command(&session, verb, command).await;
            });
        }

        TcpEvent::Close(client) => lifecycle::close(state, &client).await,

        TcpEvent::Error { client, error } => {
            tracing::info!(conn = %client.id(), %error, "client error");
        }
    }
}

async fn on_udp_event<S, D, A>(state: &Arc<ServerState<S, D, A>>, event: UdpEvent)
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    let name = event.name();
    match event {
        UdpEvent::Command { peer, command } => {
            if Verb::of(&command) == Some(Verb::Echo) {
                let state = Arc::clone(state);
                tokio::spawn(async move {
                    state.handle_echo(&peer, &command).await;
                });
            } else {
                state.audit.request(&command).await;
                tracing::debug!(peer = %peer.addr(), event = %name, query = %command.query, "unhandled datagram");
            }
        }
    }
}
