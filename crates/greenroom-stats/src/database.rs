//! The persistence interface used by command handlers.

use std::future::Future;
use std::sync::Arc;

use greenroom_protocol::{GameId, Shard, Team};

use crate::{Hero, HeroStat, NewGame, StatPair, StatsError};

/// Relational operations the engine performs.
///
/// Every call is independent; there are no transactions spanning calls.
/// Row-changing operations that target games are scoped by `(gid, shard)`
/// so one process never touches rows owned by another shard.
pub trait GameDatabase: Send + Sync + 'static {
    /// Looks up a hero by id.
    fn hero(&self, hero_id: u64) -> impl Future<Output = Result<Option<Hero>, StatsError>> + Send;

    /// Reads the listed stats of a hero. Missing stats are simply absent
    /// from the result.
    fn hero_stats(
        &self,
        hero_id: u64,
        keys: &[&str],
    ) -> impl Future<Output = Result<Vec<HeroStat>, StatsError>> + Send;

    /// Inserts the row of a newly advertised game.
    fn add_game(&self, game: &NewGame) -> impl Future<Output = Result<(), StatsError>> + Send;

    /// A player was accepted into the join queue of a game.
    fn game_player_joining(
        &self,
        gid: GameId,
        shard: &Shard,
    ) -> impl Future<Output = Result<(), StatsError>> + Send;

    /// A joining player entered the match on `team`.
    fn game_player_entered(
        &self,
        gid: GameId,
        shard: &Shard,
        team: Team,
    ) -> impl Future<Output = Result<(), StatsError>> + Send;

    /// A player on `team` left the match.
    fn game_player_left(
        &self,
        gid: GameId,
        shard: &Shard,
        team: Team,
    ) -> impl Future<Output = Result<(), StatsError>> + Send;

    /// Refreshes a game's `updated_at`.
    fn touch_game(&self, gid: GameId, shard: &Shard)
    -> impl Future<Output = Result<(), StatsError>> + Send;

    /// Deletes every server and player stat row of a game. Returns the
    /// number of rows removed.
    fn delete_game_stats(&self, gid: GameId) -> impl Future<Output = Result<u64, StatsError>> + Send;

    /// Deletes a game's row. Returns the number of rows removed.
    fn delete_game(
        &self,
        gid: GameId,
        shard: &Shard,
    ) -> impl Future<Output = Result<u64, StatsError>> + Send;

    /// Upserts server stats of a game; later values win.
    fn set_server_stats(
        &self,
        gid: GameId,
        stats: &[StatPair],
    ) -> impl Future<Output = Result<(), StatsError>> + Send;

    /// Upserts stats of one player in a game; later values win.
    fn set_player_stats(
        &self,
        gid: GameId,
        player_id: u64,
        stats: &[StatPair],
    ) -> impl Future<Output = Result<(), StatsError>> + Send;
}

impl<T: GameDatabase> GameDatabase for Arc<T> {
    fn hero(&self, hero_id: u64) -> impl Future<Output = Result<Option<Hero>, StatsError>> + Send {
        (**self).hero(hero_id)
    }

    fn hero_stats(
        &self,
        hero_id: u64,
        keys: &[&str],
    ) -> impl Future<Output = Result<Vec<HeroStat>, StatsError>> + Send {
        (**self).hero_stats(hero_id, keys)
    }

    fn add_game(&self, game: &NewGame) -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).add_game(game)
    }

    fn game_player_joining(
        &self,
        gid: GameId,
        shard: &Shard,
    ) -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).game_player_joining(gid, shard)
    }

    fn game_player_entered(
        &self,
        gid: GameId,
        shard: &Shard,
        team: Team,
    ) -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).game_player_entered(gid, shard, team)
    }

    fn game_player_left(
        &self,
        gid: GameId,
        shard: &Shard,
        team: Team,
    ) -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).game_player_left(gid, shard, team)
    }

    fn touch_game(&self, gid: GameId, shard: &Shard)
    -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).touch_game(gid, shard)
    }

    fn delete_game_stats(&self, gid: GameId) -> impl Future<Output = Result<u64, StatsError>> + Send {
        (**self).delete_game_stats(gid)
    }

    fn delete_game(
        &self,
        gid: GameId,
        shard: &Shard,
    ) -> impl Future<Output = Result<u64, StatsError>> + Send {
        (**self).delete_game(gid, shard)
    }

    fn set_server_stats(
        &self,
        gid: GameId,
        stats: &[StatPair],
    ) -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).set_server_stats(gid, stats)
    }

    fn set_player_stats(
        &self,
        gid: GameId,
        player_id: u64,
        stats: &[StatPair],
    ) -> impl Future<Output = Result<(), StatsError>> + Send {
        (**self).set_player_stats(gid, player_id, stats)
    }
}
