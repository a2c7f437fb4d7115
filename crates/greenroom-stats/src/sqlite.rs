//! SQLite implementation of [`GameDatabase`].
//!
//! The fixed statements are prepared once while connecting; if any of them
//! fails to prepare the connect call fails and the server never starts.
//! Bulk statements go through the [`StatementCache`].

use std::str::FromStr;

use greenroom_protocol::{GameId, Shard, Team};
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::{
    GameDatabase, Hero, HeroStat, MAX_BATCH_ARITY, NewGame, Prepare, StatPair, StatementCache,
    StatementFamily, StatsError,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where the relational store lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://greenroom.db` or `sqlite::memory:`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

impl DatabaseConfig {
    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

// ---------------------------------------------------------------------------
// Schema and fixed statements
// ---------------------------------------------------------------------------

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS games (
        gid INTEGER NOT NULL,
        shard TEXT NOT NULL,
        game_ip TEXT NOT NULL,
        game_port INTEGER NOT NULL,
        game_version TEXT NOT NULL,
        status_join TEXT NOT NULL,
        status_mapname TEXT NOT NULL,
        players_connected INTEGER NOT NULL DEFAULT 0,
        players_joining INTEGER NOT NULL DEFAULT 0,
        players_max INTEGER NOT NULL DEFAULT 0,
        team_1 INTEGER NOT NULL DEFAULT 0,
        team_2 INTEGER NOT NULL DEFAULT 0,
        team_distribution TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (gid, shard)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_server_stats (
        gid INTEGER NOT NULL,
        statsKey TEXT NOT NULL,
        statsValue TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (gid, statsKey)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_server_player_stats (
        gid INTEGER NOT NULL,
        pid INTEGER NOT NULL,
        statsKey TEXT NOT NULL,
        statsValue TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (gid, pid, statsKey)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_heroes (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        heroName TEXT NOT NULL,
        online INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_stats (
        user_id INTEGER NOT NULL,
        heroID INTEGER NOT NULL,
        statsKey TEXT NOT NULL,
        statsValue TEXT NOT NULL,
        PRIMARY KEY (user_id, heroID, statsKey)
    )
    "#,
];

const HERO_BY_ID: &str = "SELECT id, user_id, heroName, online FROM game_heroes WHERE id = ?";

const DELETE_SERVER_STATS: &str = "DELETE FROM game_server_stats WHERE gid = ?";

const DELETE_PLAYER_STATS: &str = "DELETE FROM game_server_player_stats WHERE gid = ?";

const DELETE_GAME: &str = "DELETE FROM games WHERE gid = ? AND shard = ?";

const ADD_GAME: &str = "INSERT INTO games (gid, shard, game_ip, game_port, game_version, \
     status_join, status_mapname, players_connected, players_joining, players_max, \
     team_1, team_2, team_distribution, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)";

const GAME_JOINING: &str = "UPDATE games SET players_joining = players_joining + 1, \
     updated_at = CURRENT_TIMESTAMP WHERE gid = ? AND shard = ?";

const GAME_ENTERED_TEAM_1: &str = "UPDATE games SET players_connected = players_connected + 1, \
     players_joining = MAX(players_joining - 1, 0), team_1 = team_1 + 1, \
     updated_at = CURRENT_TIMESTAMP WHERE gid = ? AND shard = ?";

const GAME_ENTERED_TEAM_2: &str = "UPDATE games SET players_connected = players_connected + 1, \
     players_joining = MAX(players_joining - 1, 0), team_2 = team_2 + 1, \
     updated_at = CURRENT_TIMESTAMP WHERE gid = ? AND shard = ?";

const GAME_LEFT_TEAM_1: &str = "UPDATE games SET players_connected = MAX(players_connected - 1, 0), \
     team_1 = MAX(team_1 - 1, 0), updated_at = CURRENT_TIMESTAMP WHERE gid = ? AND shard = ?";

const GAME_LEFT_TEAM_2: &str = "UPDATE games SET players_connected = MAX(players_connected - 1, 0), \
     team_2 = MAX(team_2 - 1, 0), updated_at = CURRENT_TIMESTAMP WHERE gid = ? AND shard = ?";

const TOUCH_GAME: &str = "UPDATE games SET updated_at = CURRENT_TIMESTAMP WHERE gid = ? AND shard = ?";

const FIXED_STATEMENTS: [&str; 11] = [
    HERO_BY_ID,
    DELETE_SERVER_STATS,
    DELETE_PLAYER_STATS,
    DELETE_GAME,
    ADD_GAME,
    GAME_JOINING,
    GAME_ENTERED_TEAM_1,
    GAME_ENTERED_TEAM_2,
    GAME_LEFT_TEAM_1,
    GAME_LEFT_TEAM_2,
    TOUCH_GAME,
];

// ---------------------------------------------------------------------------
// SqliteDatabase
// ---------------------------------------------------------------------------

/// sqlx-backed [`GameDatabase`].
pub struct SqliteDatabase {
    pool: SqlitePool,
    statements: StatementCache<SqlitePool>,
}

impl SqliteDatabase {
    /// Opens the pool described by `config`, creates the schema and
    /// prepares every fixed statement.
    ///
    /// # Errors
    /// [`StatsError::Connect`] if the pool or schema cannot be set up, and
    /// [`StatsError::Prepare`] if a fixed statement is rejected.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StatsError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(StatsError::Connect)?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections.max(1));
        if config.is_memory() {
            // Each in-memory connection is its own database, so the one
            // connection must never be recycled.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StatsError::Connect)?;
        tracing::info!(url = %config.url, "database connected");

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool, creating the schema and preparing the fixed
    /// statements.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StatsError> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(StatsError::Connect)?;
        }

        for sql in FIXED_STATEMENTS {
            pool.prepare_statement(sql).await?;
        }
        tracing::debug!(count = FIXED_STATEMENTS.len(), "fixed statements prepared");

        Ok(Self {
            statements: StatementCache::new(pool.clone()),
            pool,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The bulk statement cache, exposed for inspection.
    pub fn statements(&self) -> &StatementCache<SqlitePool> {
        &self.statements
    }

    async fn execute_scoped(
        &self,
        statement: &'static str,
        sql: &'static str,
        gid: GameId,
        shard: &Shard,
    ) -> Result<u64, StatsError> {
        let result = sqlx::query(sql)
            .bind(sql_id("gid", gid.0)?)
            .bind(shard.as_str())
            .execute(&self.pool)
            .await
            .map_err(|source| StatsError::Query { statement, source })?;
        Ok(result.rows_affected())
    }
}

/// SQLite integers are signed; ids above `i64::MAX` are rejected rather
/// than wrapped.
fn sql_id(field: &'static str, value: u64) -> Result<i64, StatsError> {
    i64::try_from(value).map_err(|_| StatsError::IdOutOfRange { field, value })
}

fn hero_from_row(row: &SqliteRow) -> Result<Hero, sqlx::Error> {
    Ok(Hero {
        id: row.try_get::<i64, _>("id")? as u64,
        user_id: row.try_get::<i64, _>("user_id")? as u64,
        name: row.try_get("heroName")?,
        online: row.try_get::<i64, _>("online")? != 0,
    })
}

fn hero_stat_from_row(row: &SqliteRow) -> Result<HeroStat, sqlx::Error> {
    Ok(HeroStat {
        user_id: row.try_get::<i64, _>(0)? as u64,
        hero_id: row.try_get::<i64, _>(1)? as u64,
        hero_name: row.try_get(2)?,
        key: row.try_get(3)?,
        value: row.try_get(4)?,
    })
}

impl GameDatabase for SqliteDatabase {
    async fn hero(&self, hero_id: u64) -> Result<Option<Hero>, StatsError> {
        let row = sqlx::query(HERO_BY_ID)
            .bind(sql_id("hero id", hero_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| StatsError::Query {
                statement: "hero by id",
                source,
            })?;

        row.as_ref()
            .map(hero_from_row)
            .transpose()
            .map_err(|source| StatsError::Query {
                statement: "hero by id",
                source,
            })
    }

    async fn hero_stats(&self, hero_id: u64, keys: &[&str]) -> Result<Vec<HeroStat>, StatsError> {
        let hero_id = sql_id("hero id", hero_id)?;
        let mut stats = Vec::new();
        for chunk in keys.chunks(MAX_BATCH_ARITY) {
            let template = self
                .statements
                .get_or_build(StatementFamily::HeroStats, chunk.len())
                .await?;

            let mut query = sqlx::query(template.sql()).bind(hero_id);
            for key in chunk {
                query = query.bind(*key);
            }
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|source| StatsError::Query {
                    statement: "hero stat read",
                    source,
                })?;

            for row in &rows {
                stats.push(hero_stat_from_row(row).map_err(|source| StatsError::Query {
                    statement: "hero stat read",
                    source,
                })?);
            }
        }
        Ok(stats)
    }

    async fn add_game(&self, game: &NewGame) -> Result<(), StatsError> {
        sqlx::query(ADD_GAME)
            .bind(sql_id("gid", game.gid.0)?)
            .bind(game.shard.as_str())
            .bind(game.ip.as_str())
            .bind(i64::from(game.port))
            .bind(game.version.as_str())
            .bind(game.status_join.as_str())
            .bind(game.status_mapname.as_str())
            .bind(i64::from(game.players_connected))
            .bind(i64::from(game.players_joining))
            .bind(i64::from(game.players_max))
            .bind(i64::from(game.team_1))
            .bind(i64::from(game.team_2))
            .bind(game.team_distribution.as_str())
            .execute(&self.pool)
            .await
            .map_err(|source| StatsError::Query {
                statement: "add game",
                source,
            })?;
        Ok(())
    }

    async fn game_player_joining(&self, gid: GameId, shard: &Shard) -> Result<(), StatsError> {
        self.execute_scoped("game player joining", GAME_JOINING, gid, shard)
            .await
            .map(|_| ())
    }

    async fn game_player_entered(
        &self,
        gid: GameId,
        shard: &Shard,
        team: Team,
    ) -> Result<(), StatsError> {
        let sql = match team {
            Team::One => GAME_ENTERED_TEAM_1,
            Team::Two => GAME_ENTERED_TEAM_2,
        };
        self.execute_scoped("game player entered", sql, gid, shard)
            .await
            .map(|_| ())
    }

    async fn game_player_left(&self, gid: GameId, shard: &Shard, team: Team) -> Result<(), StatsError> {
        let sql = match team {
            Team::One => GAME_LEFT_TEAM_1,
            Team::Two => GAME_LEFT_TEAM_2,
        };
        self.execute_scoped("game player left", sql, gid, shard)
            .await
            .map(|_| ())
    }

    async fn touch_game(&self, gid: GameId, shard: &Shard) -> Result<(), StatsError> {
        self.execute_scoped("touch game", TOUCH_GAME, gid, shard)
            .await
            .map(|_| ())
    }

    async fn delete_game_stats(&self, gid: GameId) -> Result<u64, StatsError> {
        let gid = sql_id("gid", gid.0)?;
        let mut removed = 0;
        for (statement, sql) in [
            ("delete server stats", DELETE_SERVER_STATS),
            ("delete player stats", DELETE_PLAYER_STATS),
        ] {
            let result = sqlx::query(sql)
                .bind(gid)
                .execute(&self.pool)
                .await
                .map_err(|source| StatsError::Query { statement, source })?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn delete_game(&self, gid: GameId, shard: &Shard) -> Result<u64, StatsError> {
        self.execute_scoped("delete game", DELETE_GAME, gid, shard).await
    }

    async fn set_server_stats(&self, gid: GameId, stats: &[StatPair]) -> Result<(), StatsError> {
        let gid = sql_id("gid", gid.0)?;
        for chunk in stats.chunks(MAX_BATCH_ARITY) {
            let template = self
                .statements
                .get_or_build(StatementFamily::ServerStats, chunk.len())
                .await?;

            let mut query = sqlx::query(template.sql());
            for (key, value) in chunk {
                query = query.bind(gid).bind(key.as_str()).bind(value.as_str());
            }
            query
                .execute(&self.pool)
                .await
                .map_err(|source| StatsError::Query {
                    statement: "server stat upsert",
                    source,
                })?;
        }
        Ok(())
    }

    async fn set_player_stats(
        &self,
        gid: GameId,
        player_id: u64,
        stats: &[StatPair],
    ) -> Result<(), StatsError> {
        let gid = sql_id("gid", gid.0)?;
        let player_id = sql_id("player id", player_id)?;
        for chunk in stats.chunks(MAX_BATCH_ARITY) {
            let template = self
                .statements
                .get_or_build(StatementFamily::PlayerStats, chunk.len())
                .await?;

            let mut query = sqlx::query(template.sql());
            for (key, value) in chunk {
                query = query
                    .bind(gid)
                    .bind(player_id)
                    .bind(key.as_str())
                    .bind(value.as_str());
            }
            query
                .execute(&self.pool)
                .await
                .map_err(|source| StatsError::Query {
                    statement: "player stat upsert",
                    source,
                })?;
        }
        Ok(())
    }
}
