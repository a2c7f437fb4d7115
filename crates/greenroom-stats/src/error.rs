//! Error types for the persistence layer.

use crate::StatementFamily;

/// Errors raised by statement construction and database calls.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// A bulk statement was requested for zero rows.
    #[error("{family} statement needs at least one row")]
    EmptyBatch { family: StatementFamily },

    /// A bulk statement was requested for more rows than one statement
    /// may carry. Callers split batches at [`MAX_BATCH_ARITY`](crate::MAX_BATCH_ARITY).
    #[error("{family} statement with {arity} rows exceeds the batch limit")]
    ArityTooLarge {
        family: StatementFamily,
        arity: usize,
    },

    /// The database rejected a statement at prepare time.
    #[error("failed to prepare statement `{sql}`: {source}")]
    Prepare {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    /// Executing a statement failed.
    #[error("{statement} failed: {source}")]
    Query {
        statement: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// An id does not fit SQLite's signed 64-bit integer.
    #[error("{field} {value} is out of range for the database")]
    IdOutOfRange { field: &'static str, value: u64 },

    /// Opening the connection pool or creating the schema failed.
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
}
