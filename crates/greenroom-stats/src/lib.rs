//! Relational persistence for greenroom.
//!
//! Game servers are mirrored as rows in `games`, and in-match statistics are
//! written in bulk to `game_server_stats` / `game_server_player_stats`. The
//! bulk statements have a variable number of value groups (one per stat
//! the client reported), so their text depends on the batch size:
//!
//! - [`StatementTemplate::build`] is a pure builder: family + arity → SQL.
//! - [`StatementCache`] prepares each `(family, arity)` once against the
//!   database and hands out the same template forever after.
//! - [`GameDatabase`] is the interface handlers use; [`SqliteDatabase`] is
//!   the sqlx implementation.

#![allow(async_fn_in_trait)]

mod cache;
mod database;
mod error;
mod model;
mod sqlite;
mod statement;

pub use cache::{Prepare, StatementCache};
pub use database::GameDatabase;
pub use error::StatsError;
pub use model::{Hero, HeroStat, NewGame, StatPair};
pub use sqlite::{DatabaseConfig, SqliteDatabase};
pub use statement::{MAX_BATCH_ARITY, StatementFamily, StatementTemplate};
