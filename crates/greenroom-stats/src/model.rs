//! Row types passed to and from the database.

use greenroom_protocol::{GameId, Shard};

/// A `(statsKey, statsValue)` pair as reported by a command.
pub type StatPair = (String, String);

/// Values for a new `games` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub gid: GameId,
    pub shard: Shard,
    pub ip: String,
    pub port: u16,
    pub version: String,
    pub status_join: String,
    pub status_mapname: String,
    pub players_connected: u32,
    pub players_joining: u32,
    pub players_max: u32,
    pub team_1: u32,
    pub team_2: u32,
    pub team_distribution: String,
}

/// A row of `game_heroes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hero {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub online: bool,
}

/// One stat of a hero, as returned by the hero-stat read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeroStat {
    pub user_id: u64,
    pub hero_id: u64,
    pub hero_name: String,
    pub key: String,
    pub value: String,
}
