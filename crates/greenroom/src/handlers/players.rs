//! The join flow and in-match player tracking: EGAM, EGRS, ECNL, PENT,
//! PLVT, UPLA.
//!
//! ```text
//! player ──EGAM──→ theater ──EGRQ──→ game server
//!                                       │
//! player ←─EGEG── theater ←──EGRS───────┘   (when ALLOWED=1)
//! ```
//!
//! Between EGAM and EGRS the pending join is parked in the session store
//! under `join:<PID>`.

use std::collections::HashMap;

use greenroom_protocol::{Answer, Command, FrameFlag, GameId, Team};
use greenroom_session::{Authorizer, ClientSession, SessionStore, fields, keys};
use greenroom_stats::GameDatabase;
use greenroom_transport::ConnectionId;

use super::{LOBBY_ID, random_token, stat_pairs};
use crate::GreenroomError;
use crate::server::ServerState;

/// Hero stat holding the player's team.
const TEAM_STAT: &str = "c_team";

const JOIN_CONN: &str = "conn";
const JOIN_GID: &str = "gid";
const JOIN_TICKET: &str = "ticket";

impl<S, D, A> ServerState<S, D, A>
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    /// A player asks to join a game.
    pub(super) async fn handle_egam(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let conn = session.id();
        let gid = command.game_id()?;
        let pid = command.number("PID")?;

        let Some(owner) = self.registry.owner(gid).await else {
            tracing::info!(%conn, %gid, pid, "join requested for an unlisted game");
            return Ok(());
        };

        if let Err(e) = self.db.game_player_joining(gid, &self.shard).await {
            tracing::error!(%conn, %gid, error = %e, "failed to count joining player");
        }
        self.registry.update(gid, |server| server.player_joining()).await?;

        let answer = Answer::new()
            .with("TID", command.tid())
            .with("LID", LOBBY_ID)
            .with("GID", gid);
        self.respond(session.client(), "EGAM", answer, FrameFlag::PLAIN)
            .await?;

        let record = self.store.get_all(session.store_key()).await?;
        let field = |name: &str| record.get(name).cloned().unwrap_or_default();
        let ticket = random_token(10);
        let addr = session.client().addr();

        // Parked before EGRQ goes out; the EGRS answer can arrive right after.
        let parked = [
            (JOIN_CONN.to_string(), conn.into_inner().to_string()),
            (JOIN_GID.to_string(), gid.to_string()),
            (JOIN_TICKET.to_string(), ticket.clone()),
        ];
        self.store.set_many(&keys::join(pid), &parked).await?;

        let request = Answer::new()
            .with("R-INT-IP", command.get("R-INT-IP"))
            .with("R-INT-PORT", command.get("R-INT-PORT"))
            .with("IP", addr.ip())
            .with("PORT", addr.port())
            .with("NAME", field(fields::USERNAME))
            .with("PTYPE", "P")
            .with("TICKET", &ticket)
            .with("PID", pid)
            .with("UID", field(fields::USER_ID))
            .with("LID", LOBBY_ID)
            .with("GID", gid);
        self.respond(&owner, "EGRQ", request, FrameFlag::PLAIN).await?;

        tracing::debug!(%conn, %gid, pid, owner = %owner.id(), "join forwarded to game server");
        Ok(())
    }

    /// The game server's verdict on a forwarded join.
    pub(super) async fn handle_egrs(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let pid = command.number("PID")?;
        let join_key = keys::join(pid);
        let parked = self.store.get_all(&join_key).await?;

        if command.get("ALLOWED") == "1" && !parked.is_empty() {
            if let Err(e) = self.admit_player(pid, &parked).await {
                tracing::warn!(conn = %session.id(), pid, error = %e, "failed to admit player");
            }
        } else {
            tracing::debug!(conn = %session.id(), pid, "join not allowed or not pending");
        }

        self.store.delete(&join_key).await?;

        let answer = Answer::new().with("TID", command.tid());
        self.respond(session.client(), "EGRS", answer, FrameFlag::PLAIN)
            .await
    }

    /// Sends `EGEG` with the game's address to the player who asked to join.
    async fn admit_player(
        &self,
        pid: u64,
        parked: &HashMap<String, String>,
    ) -> Result<(), GreenroomError> {
        let field = |name: &str| parked.get(name).map(String::as_str).unwrap_or("");
        let gid: GameId = field(JOIN_GID).parse()?;
        let conn = ConnectionId::new(field(JOIN_CONN).parse().unwrap_or_default());

        let Some(player) = self.sessions.lock().await.get(conn) else {
            tracing::debug!(%conn, pid, "joining player already gone");
            return Ok(());
        };
        let game = self.store.get_all(&keys::game(gid)).await?;
        let game_field = |name: &str| game.get(name).map(String::as_str).unwrap_or("");

        let answer = Answer::new()
            .with("PL", "pc")
            .with("TICKET", field(JOIN_TICKET))
            .with("PID", pid)
            .with("I", game_field("IP"))
            .with("P", game_field("PORT"))
            .with("HUID", game_field("UGID"))
            .with("INT-IP", game_field("INT-IP"))
            .with("INT-PORT", game_field("INT-PORT"))
            .with("EKEY", game_field("EKEY"))
            .with("UGID", game_field("UGID"))
            .with("LID", LOBBY_ID)
            .with("GID", gid);
        self.respond(player.client(), "EGEG", answer, FrameFlag::PLAIN)
            .await
    }

    /// A player leaves the join queue.
    pub(super) async fn handle_ecnl(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let answer = Answer::new()
            .with("TID", command.tid())
            .with("GID", command.get("GID"))
            .with("LID", command.get("LID"));
        self.respond(session.client(), "ECNL", answer, FrameFlag::PLAIN)
            .await
    }

    /// A joining player entered the match.
    pub(super) async fn handle_pent(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let gid = command.game_id()?;
        let pid = command.number("PID")?;

        match self.player_team(pid).await? {
            Some(team) => {
                if let Err(e) = self.db.game_player_entered(gid, &self.shard, team).await {
                    tracing::error!(%gid, pid, error = %e, "failed to count entered player");
                }
                self.registry
                    .update(gid, |server| server.player_entered(team))
                    .await?;
            }
            None => tracing::warn!(%gid, pid, "player has no team, counts unchanged"),
        }

        let answer = Answer::new().with("TID", command.tid()).with("PID", pid);
        self.respond(session.client(), "PENT", answer, FrameFlag::PLAIN)
            .await
    }

    /// A player left the match.
    pub(super) async fn handle_plvt(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let gid = command.game_id()?;
        let pid = command.number("PID")?;

        match self.player_team(pid).await? {
            Some(team) => {
                if let Err(e) = self.db.game_player_left(gid, &self.shard, team).await {
                    tracing::error!(%gid, pid, error = %e, "failed to count leaving player");
                }
                self.registry
                    .update(gid, |server| server.player_left(team))
                    .await?;
            }
            None => tracing::warn!(%gid, pid, "player has no team, counts unchanged"),
        }

        let answer = Answer::new().with("TID", command.tid());
        self.respond(session.client(), "PLVT", answer, FrameFlag::PLAIN)
            .await
    }

    /// A game server reports player stats. No answer.
    pub(super) async fn handle_upla(
        &self,
        _session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let gid = command.game_id()?;
        let pid = command.number("PID")?;
        let stats = stat_pairs(command, "P-");
        if stats.is_empty() {
            return Ok(());
        }
        self.db.set_player_stats(gid, pid, &stats).await?;
        tracing::debug!(%gid, pid, count = stats.len(), "player stats stored");
        Ok(())
    }

    async fn player_team(&self, hero_id: u64) -> Result<Option<Team>, GreenroomError> {
        let stats = self.db.hero_stats(hero_id, &[TEAM_STAT]).await?;
        Ok(stats
            .iter()
            .find(|stat| stat.key == TEAM_STAT)
            .and_then(|stat| Team::from_stat(&stat.value)))
    }
}
