//! Per-session liveness probe.
//!
//! Every active session gets a task that sends `PING {TID=0}` at a fixed
//! interval. The task checks the session on every tick and also wakes as
//! soon as the client's liveness flag flips, so it never outlives its
//! connection by more than one scheduler turn.

use std::sync::Arc;

use greenroom_protocol::{Answer, FrameFlag};
use greenroom_tick::{TickConfig, Ticker};
use tokio::task::JoinHandle;

use crate::ClientSession;

/// Query name of the liveness probe.
pub const PING_QUERY: &str = "PING";

/// Spawns the heartbeat task for `session`.
///
/// The task ends when the session stops being active, when the client is
/// marked inactive, or when a probe cannot be written.
pub fn spawn_heartbeat(session: Arc<ClientSession>, config: TickConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let conn = session.id();
        let mut liveness = session.client().liveness();
        let mut ticker = Ticker::new(config);

        tracing::debug!(%conn, period_ms = ticker.period().as_millis() as u64, "heartbeat started");

        loop {
            tokio::select! {
                _ = ticker.wait_for_tick() => {
                    if !session.is_active() {
                        break;
                    }
                    let ping = Answer::new().with("TID", 0);
                    if let Err(e) = session.client().write(PING_QUERY, ping, FrameFlag::PLAIN) {
                        tracing::debug!(%conn, error = %e, "heartbeat write failed");
                        break;
                    }
                }
                changed = liveness.changed() => {
                    if changed.is_err() || !*liveness.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(%conn, ticks = ticker.tick_count(), "heartbeat stopped");
    })
}
