//! Game listing and advertisement: LLST, GLST, GDAT, CGAM, UGAM, UBRA.

use std::sync::Arc;

use greenroom_protocol::{Answer, Command, FrameFlag, GameId};
use greenroom_registry::GameServer;
use greenroom_session::{Authorizer, ClientSession, SessionStore, fields, keys};
use greenroom_stats::{GameDatabase, NewGame};

use super::{LOBBY_ID, random_token, stat_pairs};
use crate::server::ServerState;
use crate::{GreenroomError, lifecycle};

/// Advertised capacity of the lobby.
const LOBBY_MAX_GAMES: u32 = 1000;

impl<S, D, A> ServerState<S, D, A>
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    pub(super) async fn handle_llst(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let games = self.registry.len().await;

        let answer = Answer::new()
            .with("TID", command.tid())
            .with("NUM-LOBBIES", 1);
        self.respond(session.client(), "LLST", answer, FrameFlag::PLAIN)
            .await?;

        let lobby = Answer::new()
            .with("TID", command.tid())
            .with("LID", LOBBY_ID)
            .with("NAME", &self.name)
            .with("LOCALE", "en_US")
            .with("MAX-GAMES", LOBBY_MAX_GAMES)
            .with("FAVORITE-GAMES", 0)
            .with("FAVORITE-PLAYERS", 0)
            .with("NUM-GAMES", games);
        self.respond(session.client(), "LDAT", lobby, FrameFlag::PLAIN)
            .await
    }

    pub(super) async fn handle_glst(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let servers = self.registry.list().await;

        let answer = Answer::new()
            .with("TID", command.tid())
            .with("LID", LOBBY_ID)
            .with("LOBBY-NUM-GAMES", servers.len())
            .with("LOBBY-MAX-GAMES", LOBBY_MAX_GAMES)
            .with("FAVORITE-GAMES", 0)
            .with("FAVORITE-PLAYERS", 0)
            .with("NUM-GAMES", servers.len());
        self.respond(session.client(), "GLST", answer, FrameFlag::PLAIN)
            .await?;

        for server in &servers {
            self.respond(
                session.client(),
                "GDAT",
                listing(command.tid(), server),
                FrameFlag::PLAIN,
            )
            .await?;
        }
        Ok(())
    }

    pub(super) async fn handle_gdat(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let server = match command.game_id() {
            Ok(gid) => self.registry.get(gid).await,
            Err(_) => None,
        };

        let answer = match server {
            Some(server) => listing(command.tid(), &server),
            None => Answer::new().with("TID", command.tid()),
        };
        self.respond(session.client(), "GDAT", answer, FrameFlag::PLAIN)
            .await
    }

    /// A game server advertises a new game.
    pub(super) async fn handle_cgam(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let conn = session.id();
        let client = session.client();

        // One advertised game per connection.
        let previous = self
            .store
            .get(session.store_key(), fields::GAME_ID)
            .await?
            .and_then(|raw| raw.parse::<GameId>().ok());
        if let Some(previous) = previous {
            tracing::info!(%conn, gid = %previous, "client advertises a new game, releasing its previous one");
            lifecycle::release_game(self, previous).await;
        }

        let gid = GameId(self.store.increment(keys::COUNTER_GID).await?);

        let mut server = GameServer::new(gid);
        server.ext_ip = client.addr().ip().to_string();
        server.ext_port = command
            .get("PORT")
            .parse()
            .unwrap_or_else(|_| client.addr().port());
        server.int_ip = command.get("INT-IP").to_string();
        server.int_port = command.get("INT-PORT").parse().unwrap_or_default();
        for (key, value) in &command.message {
            server.apply_prop(key, value);
        }

        let row = NewGame {
            gid,
            shard: self.shard.clone(),
            ip: server.ext_ip.clone(),
            port: server.ext_port,
            version: server.version.clone(),
            status_join: server.join_mode.clone(),
            status_mapname: server.map.clone(),
            players_connected: 0,
            players_joining: 0,
            players_max: server.max_players,
            team_1: 0,
            team_2: 0,
            team_distribution: server.team_distribution.clone(),
        };
        if let Err(e) = self.db.add_game(&row).await {
            tracing::error!(%conn, %gid, error = %e, "failed to persist new game, not registering it");
            return Err(e.into());
        }
        if !session.is_active() {
            tracing::info!(%conn, %gid, "owner left before the game was registered");
            lifecycle::release_game(self, gid).await;
            return Ok(());
        }

        let secret = random_token(32);
        let ekey = random_token(24);
        let mut cached = vec![
            ("GID".to_string(), gid.to_string()),
            ("IP".to_string(), server.ext_ip.clone()),
            ("PORT".to_string(), server.ext_port.to_string()),
            ("INT-IP".to_string(), server.int_ip.clone()),
            ("INT-PORT".to_string(), server.int_port.to_string()),
            ("MAX-PLAYERS".to_string(), server.max_players.to_string()),
            ("JOIN".to_string(), server.join_mode.clone()),
            ("UGID".to_string(), command.get("UGID").to_string()),
            ("EKEY".to_string(), ekey.clone()),
            ("SECRET".to_string(), secret.clone()),
        ];
        cached.extend(stat_pairs(command, "B-"));

        let max_players = server.max_players;
        let join_mode = server.join_mode.clone();
        if let Err(e) = self.registry.insert(server, Arc::clone(client)).await {
            tracing::error!(%conn, %gid, error = %e, "failed to register new game, dropping its row");
            if let Err(db_err) = self.db.delete_game(gid, &self.shard).await {
                tracing::error!(%conn, %gid, shard = %self.shard, error = %db_err, "failed deleting game row");
            }
            return Err(e.into());
        }
        if let Err(e) = self.record_game(session, gid, &cached).await {
            lifecycle::release_game(self, gid).await;
            return Err(e);
        }

        // A close that started during the writes above may have cleaned up
        // before the game was visible to it.
        if !session.is_active() {
            tracing::info!(%conn, %gid, "owner left while the game was being created");
            lifecycle::release_game(self, gid).await;
            if let Err(e) = self.store.delete(session.store_key()).await {
                tracing::error!(%conn, error = %e, "failed to delete session record");
            }
            return Ok(());
        }

        tracing::info!(%conn, %gid, shard = %self.shard, "game created");

        let answer = Answer::new()
            .with("TID", command.tid())
            .with("LID", LOBBY_ID)
            .with("UGID", command.get("UGID"))
            .with("MAX-PLAYERS", max_players)
            .with("EKEY", ekey)
            .with("SECRET", secret)
            .with("JOIN", &join_mode)
            .with("J", &join_mode)
            .with("GID", gid);
        self.respond(client, "CGAM", answer, FrameFlag::PLAIN).await
    }

    /// Links a registered game to its owner's session record and caches
    /// the advertised fields.
    async fn record_game(
        &self,
        session: &ClientSession,
        gid: GameId,
        cached: &[(String, String)],
    ) -> Result<(), GreenroomError> {
        self.store
            .set(session.store_key(), fields::GAME_ID, &gid.to_string())
            .await?;
        self.store.set_many(&keys::game(gid), cached).await?;
        Ok(())
    }

    /// A game server updates its advertised properties. No answer.
    pub(super) async fn handle_ugam(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let gid = command.game_id()?;
        match self.registry.owner(gid).await {
            Some(owner) if owner.id() == session.id() => {}
            Some(owner) => {
                tracing::warn!(conn = %session.id(), owner = %owner.id(), %gid, "update of a game owned by another client ignored");
                return Ok(());
            }
            None => {
                tracing::debug!(conn = %session.id(), %gid, "update of an unlisted game ignored");
                return Ok(());
            }
        }

        let mut updates = stat_pairs(command, "B-");
        for key in ["MAX-PLAYERS", "JOIN"] {
            if let Some(value) = command.message.get(key) {
                updates.push((key.to_string(), value.clone()));
            }
        }

        self.registry
            .update(gid, |server| {
                for (key, value) in &updates {
                    server.apply_prop(key, value);
                }
            })
            .await?;
        self.store.set_many(&keys::game(gid), &updates).await?;

        let stats = stat_pairs(command, "B-");
        if !stats.is_empty() {
            self.db.set_server_stats(gid, &stats).await?;
        }
        self.db.touch_game(gid, &self.shard).await?;
        Ok(())
    }

    pub(super) async fn handle_ubra(
        &self,
        session: &ClientSession,
        command: &Command,
    ) -> Result<(), GreenroomError> {
        let answer = Answer::new().with("TID", command.tid());
        self.respond(session.client(), "UBRA", answer, FrameFlag::PLAIN)
            .await
    }
}

/// The `GDAT` description of a listed game.
fn listing(tid: &str, server: &GameServer) -> Answer {
    let mut answer = Answer::new()
        .with("TID", tid)
        .with("LID", LOBBY_ID)
        .with("GID", server.gid)
        .with("N", &server.name)
        .with("I", &server.ext_ip)
        .with("P", server.ext_port)
        .with("AP", server.active_players)
        .with("JP", server.joining_players)
        .with("QP", server.queue_length)
        .with("MP", server.max_players)
        .with("PL", "PC")
        .with("TYPE", "G")
        .with("J", &server.join_mode)
        .with("V", &server.version);
    for (key, value) in &server.props {
        answer.insert(key.clone(), value);
    }
    answer
}
