//! Cache of prepared bulk statement templates.
//!
//! Stats commands report anywhere from one to a few dozen key/value pairs,
//! and each distinct count needs its own statement text. The cache builds
//! the template for a `(family, arity)` pair the first time it is needed,
//! has the database validate it, and returns the very same `Arc` on every
//! later request.
//!
//! What is cached is the validated statement text, one per arity. The
//! server-side handle from the validating prepare is not kept; executions
//! go through sqlx's per-connection statement cache, which prepares the
//! text again on each pooled connection.
//!
//! Construction is serialized: the map lock is held across the prepare
//! call, so two handlers racing on a new arity never prepare it twice.
//! Lookups of existing templates are a map hit under the same lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{StatementFamily, StatementTemplate, StatsError};

/// Something statements can be prepared against.
///
/// Implemented for [`SqlitePool`]; tests substitute counting or failing
/// fakes.
pub trait Prepare: Send + Sync + 'static {
    /// Asks the database to parse and plan `sql`, without executing it.
    /// Only the outcome matters; the prepared handle is discarded.
    ///
    /// # Errors
    /// [`StatsError::Prepare`] when the database rejects the text.
    fn prepare_statement(&self, sql: &str) -> impl Future<Output = Result<(), StatsError>> + Send;
}

impl Prepare for SqlitePool {
    async fn prepare_statement(&self, sql: &str) -> Result<(), StatsError> {
        sqlx::Executor::prepare(self, sql)
            .await
            .map(|_| ())
            .map_err(|source| StatsError::Prepare {
                sql: sql.to_string(),
                source,
            })
    }
}

/// Grows monotonically; templates are never evicted.
pub struct StatementCache<P> {
    preparer: P,
    templates: Mutex<HashMap<(StatementFamily, usize), Arc<StatementTemplate>>>,
}

impl<P: Prepare> StatementCache<P> {
    pub fn new(preparer: P) -> Self {
        Self {
            preparer,
            templates: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the template for `(family, arity)`, building and preparing
    /// it on first use.
    ///
    /// # Errors
    /// Builder errors for out-of-range arities, or [`StatsError::Prepare`]
    /// if the database rejects the new statement. A failed arity is not
    /// cached, so a later call retries.
    pub async fn get_or_build(
        &self,
        family: StatementFamily,
        arity: usize,
    ) -> Result<Arc<StatementTemplate>, StatsError> {
        let mut templates = self.templates.lock().await;
        if let Some(template) = templates.get(&(family, arity)) {
            return Ok(Arc::clone(template));
        }

        let template = StatementTemplate::build(family, arity)?;
        if let Err(e) = self.preparer.prepare_statement(template.sql()).await {
            tracing::error!(%family, arity, error = %e, "failed to prepare bulk statement");
            return Err(e);
        }

        let template = Arc::new(template);
        templates.insert((family, arity), Arc::clone(&template));
        tracing::debug!(%family, arity, cached = templates.len(), "bulk statement prepared");
        Ok(template)
    }

    /// Number of cached templates.
    pub async fn len(&self) -> usize {
        self.templates.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.templates.lock().await.is_empty()
    }
}
