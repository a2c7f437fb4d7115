//! Pure builder for variable-arity bulk statements.
//!
//! A bulk statement is a fixed prefix, a per-row placeholder group repeated
//! `arity` times and joined with `", "`, and a fixed suffix (the `IN` list
//! close or the upsert conflict clause):
//!
//! ```text
//! INSERT INTO game_server_stats (...) VALUES  (?, ?, ?, ...), (?, ?, ?, ...)  ON CONFLICT (...) DO UPDATE ...
//! └──────────────── prefix ────────────────┘ └────── group × arity ──────┘ └────────── suffix ──────────┘
//! ```
//!
//! Nothing here touches the database, so the text for any arity can be
//! checked in isolation.

use std::fmt;

/// Largest number of rows a single bulk statement may carry. Larger batches
/// are split by the caller. Keeps the set of cached templates small.
pub const MAX_BATCH_ARITY: usize = 256;

/// The bulk statement families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementFamily {
    /// Read selected stats of one hero: `... WHERE id = ? AND statsKey IN (?, ...)`.
    HeroStats,
    /// Upsert `(gid, statsKey, statsValue)` rows.
    ServerStats,
    /// Upsert `(gid, pid, statsKey, statsValue)` rows.
    PlayerStats,
}

impl StatementFamily {
    /// Every family, for iteration in tests and warm-up.
    pub const ALL: [StatementFamily; 3] = [
        StatementFamily::HeroStats,
        StatementFamily::ServerStats,
        StatementFamily::PlayerStats,
    ];

    fn prefix(self) -> &'static str {
        match self {
            StatementFamily::HeroStats => {
                "SELECT game_heroes.user_id, game_heroes.id, game_heroes.heroName, \
                 game_stats.statsKey, game_stats.statsValue \
                 FROM game_heroes \
                 LEFT JOIN game_stats \
                 ON game_stats.user_id = game_heroes.user_id AND game_stats.heroID = game_heroes.id \
                 WHERE game_heroes.id = ? AND game_stats.statsKey IN ("
            }
            StatementFamily::ServerStats => {
                "INSERT INTO game_server_stats (gid, statsKey, statsValue, created_at, updated_at) VALUES "
            }
            StatementFamily::PlayerStats => {
                "INSERT INTO game_server_player_stats (gid, pid, statsKey, statsValue, created_at, updated_at) VALUES "
            }
        }
    }

    fn row_group(self) -> &'static str {
        match self {
            StatementFamily::HeroStats => "?",
            StatementFamily::ServerStats => "(?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            StatementFamily::PlayerStats => "(?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            StatementFamily::HeroStats => ")",
            StatementFamily::ServerStats => {
                " ON CONFLICT (gid, statsKey) DO UPDATE SET \
                 statsValue = excluded.statsValue, updated_at = CURRENT_TIMESTAMP"
            }
            StatementFamily::PlayerStats => {
                " ON CONFLICT (gid, pid, statsKey) DO UPDATE SET \
                 statsValue = excluded.statsValue, updated_at = CURRENT_TIMESTAMP"
            }
        }
    }

    /// Placeholders bound once per statement, before the rows.
    pub fn leading_params(self) -> usize {
        match self {
            StatementFamily::HeroStats => 1,
            StatementFamily::ServerStats | StatementFamily::PlayerStats => 0,
        }
    }

    /// Placeholders bound per row.
    pub fn params_per_row(self) -> usize {
        match self {
            StatementFamily::HeroStats => 1,
            StatementFamily::ServerStats => 3,
            StatementFamily::PlayerStats => 4,
        }
    }
}

impl fmt::Display for StatementFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementFamily::HeroStats => "hero-stat-read",
            StatementFamily::ServerStats => "server-stat-upsert",
            StatementFamily::PlayerStats => "player-stat-upsert",
        })
    }
}

/// The SQL text of one `(family, arity)` bulk statement.
///
/// Immutable once built. The cache shares templates as `Arc<StatementTemplate>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    family: StatementFamily,
    arity: usize,
    sql: String,
}

impl StatementTemplate {
    /// Builds the statement text for `arity` rows.
    ///
    /// # Errors
    /// - [`StatsError::EmptyBatch`](crate::StatsError::EmptyBatch) for `arity == 0`
    /// - [`StatsError::ArityTooLarge`](crate::StatsError::ArityTooLarge) above [`MAX_BATCH_ARITY`]
    pub fn build(family: StatementFamily, arity: usize) -> Result<Self, crate::StatsError> {
        if arity == 0 {
            return Err(crate::StatsError::EmptyBatch { family });
        }
        if arity > MAX_BATCH_ARITY {
            return Err(crate::StatsError::ArityTooLarge { family, arity });
        }

        let group = family.row_group();
        let mut sql = String::with_capacity(
            family.prefix().len() + arity * (group.len() + 2) + family.suffix().len(),
        );
        sql.push_str(family.prefix());
        for i in 0..arity {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(group);
        }
        sql.push_str(family.suffix());

        Ok(Self { family, arity, sql })
    }

    pub fn family(&self) -> StatementFamily {
        self.family
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Total number of placeholders the statement expects.
    pub fn param_count(&self) -> usize {
        self.family.leading_params() + self.arity * self.family.params_per_row()
    }
}
