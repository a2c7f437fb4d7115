//! FESL matchmaking status (`Status`, answered as `pnow`).

use greenroom_protocol::{Answer, Command, FrameFlag};
use greenroom_session::{Authorizer, ClientSession, SessionStore, fields};
use greenroom_stats::GameDatabase;

use super::LOBBY_ID;
use crate::GreenroomError;
use crate::server::ServerState;

/// Permission a user needs before the server looks for a game on their behalf.
pub const MATCHMAKE_PERMISSION: &str = "game.matchmake";

/// Fitness reported for every match; clients only compare it for ordering.
const MATCH_FIT: u32 = 1001;

impl<S, D, A> ServerState<S, D, A>
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    pub(super) async fn handle_status(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let conn = session.id();
        let user_id = self
            .store
            .get(session.store_key(), fields::USER_ID)
            .await?
            .unwrap_or_default();

        let allowed = match self.authz.has_permission(&user_id, MATCHMAKE_PERMISSION).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(%conn, user = %user_id, error = %e, "permission check failed");
                false
            }
        };

        let mut answer = Answer::new()
            .with("TXN", "Status")
            .with("id.id", 1)
            .with("id.partition", command.get("partition.partition"))
            .with("sessionState", "COMPLETE")
            .with("props.{}.[]", 2)
            .with("props.{resultType}", "JOIN");

        let found = if allowed {
            self.registry.find_any().await
        } else {
            tracing::info!(%conn, user = %user_id, "matchmaking denied");
            None
        };

        match found {
            Some(gid) => {
                answer.insert("props.{games}.0.lid", LOBBY_ID);
                answer.insert("props.{games}.0.fit", MATCH_FIT);
                answer.insert("props.{games}.0.gid", gid);
                answer.insert("props.{games}.[]", 1);
                tracing::debug!(%conn, %gid, "match found");
            }
            None => answer.insert("props.{games}.[]", 0),
        }

        self.respond(session.client(), "pnow", answer, FrameFlag::FESL)
            .await
    }
}
