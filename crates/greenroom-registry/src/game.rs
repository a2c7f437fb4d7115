//! Registry values: the advertised description of a game server.

use std::collections::BTreeMap;
use std::sync::Arc;

use greenroom_protocol::{GameId, Team};
use greenroom_transport::Client;

/// What a game server advertises about itself.
///
/// Populated from the `CGAM` command that created the game and kept up to
/// date by `UGAM` (advertised properties) and the join/leave commands
/// (player counts). Free-form `B-*` properties the engine does not
/// interpret are kept verbatim in `props` so listings can echo them back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameServer {
    pub gid: GameId,
    pub name: String,

    /// Address clients connect to.
    pub ext_ip: String,
    pub ext_port: u16,
    /// Address inside the server's own network, used for LAN joins.
    pub int_ip: String,
    pub int_port: u16,

    pub map: String,
    pub game_mode: String,

    pub active_players: u32,
    pub joining_players: u32,
    pub queue_length: u32,
    pub max_players: u32,

    pub team_1: u32,
    pub team_2: u32,
    pub team_distribution: String,

    pub version: String,
    pub data_center: String,
    /// Server state as advertised (`B-U-server_state`).
    pub state: String,
    /// Join mode (`O` = open).
    pub join_mode: String,

    pub props: BTreeMap<String, String>,
}

impl GameServer {
    /// Creates an empty entry for `gid`, open for joins.
    pub fn new(gid: GameId) -> Self {
        Self {
            gid,
            join_mode: "O".to_string(),
            ..Default::default()
        }
    }

    /// A player was accepted into the join queue.
    pub fn player_joining(&mut self) {
        self.joining_players += 1;
    }

    /// A joining player finished loading and is now playing on `team`.
    pub fn player_entered(&mut self, team: Team) {
        self.joining_players = self.joining_players.saturating_sub(1);
        self.active_players += 1;
        *self.team_mut(team) += 1;
    }

    /// A player on `team` left the match.
    pub fn player_left(&mut self, team: Team) {
        self.active_players = self.active_players.saturating_sub(1);
        let count = self.team_mut(team);
        *count = count.saturating_sub(1);
    }

    /// Applies one advertised property from a `CGAM`/`UGAM` command.
    ///
    /// Well-known keys update the typed fields; every `B-*` key is also kept
    /// in `props`. Returns `false` when `key` is not a game property.
    pub fn apply_prop(&mut self, key: &str, value: &str) -> bool {
        match key {
            "MAX-PLAYERS" => {
                if let Ok(max) = value.trim().parse() {
                    self.max_players = max;
                }
                return true;
            }
            "JOIN" => {
                self.join_mode = value.to_string();
                return true;
            }
            "NAME" => {
                self.name = value.to_string();
                return true;
            }
            "B-version" => self.version = value.to_string(),
            "B-U-map" => self.map = value.to_string(),
            "B-U-gamemode" => self.game_mode = value.to_string(),
            "B-U-data_center" => self.data_center = value.to_string(),
            "B-U-server_state" => self.state = value.to_string(),
            "B-U-army_distribution" => self.team_distribution = value.to_string(),
            _ if key.starts_with("B-") => {}
            _ => return false,
        }
        self.props.insert(key.to_string(), value.to_string());
        true
    }

    /// Slots not taken by active or joining players.
    pub fn open_slots(&self) -> u32 {
        self.max_players
            .saturating_sub(self.active_players + self.joining_players)
    }

    fn team_mut(&mut self, team: Team) -> &mut u32 {
        match team {
            Team::One => &mut self.team_1,
            Team::Two => &mut self.team_2,
        }
    }
}

/// A registered game together with the connection that advertised it.
///
/// The owner handle is how the engine reaches the game server, e.g. to
/// forward a join request.
#[derive(Debug, Clone)]
pub struct GameEntry {
    pub server: GameServer,
    pub owner: Arc<Client>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_game_is_open_and_empty() {
        let game = GameServer::new(GameId(7));
        assert_eq!(game.gid, GameId(7));
        assert_eq!(game.join_mode, "O");
        assert_eq!(game.active_players, 0);
    }

    #[test]
    fn test_join_then_enter_moves_player_to_team() {
        let mut game = GameServer::new(GameId(1));
        game.player_joining();
        assert_eq!(game.joining_players, 1);

        game.player_entered(Team::Two);
        assert_eq!(game.joining_players, 0);
        assert_eq!(game.active_players, 1);
        assert_eq!(game.team_2, 1);
        assert_eq!(game.team_1, 0);
    }

    #[test]
    fn test_leave_never_underflows() {
        let mut game = GameServer::new(GameId(1));
        game.player_left(Team::One);
        assert_eq!(game.active_players, 0);
        assert_eq!(game.team_1, 0);
    }

    #[test]
    fn test_open_slots_counts_joining_players() {
        let mut game = GameServer::new(GameId(1));
        game.max_players = 4;
        game.player_joining();
        game.player_joining();
        game.player_entered(Team::One);
        assert_eq!(game.open_slots(), 2);
    }

    #[test]
    fn test_apply_prop_sets_typed_fields_and_keeps_b_props() {
        let mut game = GameServer::new(GameId(1));
        assert!(game.apply_prop("B-U-map", "Harbor"));
        assert!(game.apply_prop("B-U-hardcore", "1"));
        assert!(game.apply_prop("MAX-PLAYERS", "24"));

        assert_eq!(game.map, "Harbor");
        assert_eq!(game.max_players, 24);
        assert_eq!(game.props.get("B-U-hardcore").map(String::as_str), Some("1"));
        assert!(!game.props.contains_key("MAX-PLAYERS"));
    }

    #[test]
    fn test_apply_prop_ignores_unrelated_keys() {
        let mut game = GameServer::new(GameId(1));
        assert!(!game.apply_prop("TID", "5"));
        assert!(game.apply_prop("MAX-PLAYERS", "lots"));
        assert_eq!(game.max_players, 0);
        assert!(game.props.is_empty());
    }
}
