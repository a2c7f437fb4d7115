//! Connection setup: CONN, USER and the UDP ECHO probe.

use greenroom_protocol::{Answer, Command, FrameFlag};
use greenroom_session::{Authorizer, ClientSession, SessionStore, fields};
use greenroom_stats::GameDatabase;
use greenroom_transport::UdpPeer;

use crate::GreenroomError;
use crate::server::ServerState;

/// Seconds of silence after which clients consider the theater gone.
const ACTIVITY_TIMEOUT_SECS: u32 = 240;

impl<S, D, A> ServerState<S, D, A>
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    pub(super) async fn handle_conn(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let answer = Answer::new()
            .with("TID", command.tid())
            .with("TIME", chrono::Utc::now().timestamp())
            .with("activityTimeoutSecs", ACTIVITY_TIMEOUT_SECS)
            .with("PROT", command.get("PROT"));
        self.respond(session.client(), "CONN", answer, FrameFlag::PLAIN)
            .await
    }

    pub(super) async fn handle_user(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let name = command.get("NAME");
        self.store
            .set(session.store_key(), fields::USERNAME, name)
            .await?;
        session.mark_logged_in();
        tracing::info!(conn = %session.id(), user = name, "client logged in");

        let answer = Answer::new().with("TID", command.tid()).with("NAME", name);
        self.respond(session.client(), "USER", answer, FrameFlag::PLAIN)
            .await
    }

    /// Answers a UDP keep-alive with the address the datagram came from.
    pub(crate) async fn handle_echo(&self, peer: &UdpPeer, command: &Command) {
        self.audit.request(command).await;

        let addr = peer.addr();
        let answer = Answer::new()
            .with("TXN", "ECHO")
            .with("IP", addr.ip())
            .with("PORT", addr.port())
            .with("ERR", 0)
            .with("TYPE", 1)
            .with("TID", command.tid());
        self.audit.answer("ECHO", &answer).await;

        if let Err(e) = peer.write("ECHO", answer, FrameFlag::PLAIN) {
            tracing::debug!(peer = %addr, error = %e, "echo reply not sent");
        }
    }
}
