//! SQL database sink on top of a sqlx `AnyPool` (PostgreSQL or SQLite)

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyQueryResult};
use sqlx::{Any, AnyPool};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{BatchSink, CommitPolicy, RowBinding, SqlValue};
use crate::config::DatabaseConfig;
use crate::error::SinkError;

/// Executes each batch inside one database transaction
///
/// Every binding runs on the same transaction, which commits once all rows
/// have executed and the [`CommitPolicy`] accepts their counts. Any database
/// error, or a rejected count, rolls the whole batch back.
#[derive(Clone)]
pub struct SqlxBatchSink {
    pool: AnyPool,
}

impl SqlxBatchSink {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config.url` (`postgres://...` or `sqlite:...`)
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SinkError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Run a parameterless statement, e.g. schema setup
    pub async fn execute(&self, sql: &str) -> Result<u64, SinkError> {
        let result = sqlx::query::<Any>(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn bind_row<'q>(
    sql: &'q str,
    row: RowBinding,
) -> sqlx::query::Query<'q, Any, sqlx::any::AnyArguments<'q>> {
    row.into_iter()
        .fold(sqlx::query::<Any>(sql), |query, value| match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Integer(i) => query.bind(i),
            SqlValue::Real(r) => query.bind(r),
            SqlValue::Text(s) => query.bind(s),
        })
}

#[async_trait]
impl BatchSink for SqlxBatchSink {
    #[instrument(skip_all, fields(rows = bindings.len()))]
    async fn execute_batch(
        &self,
        sql: &str,
        bindings: Vec<RowBinding>,
        policy: CommitPolicy,
    ) -> Result<Vec<u64>, SinkError> {
        let mut tx = self.pool.begin().await?;
        let mut counts = Vec::with_capacity(bindings.len());

        for row in bindings {
            let result: AnyQueryResult = bind_row(sql, row).execute(&mut *tx).await?;
            counts.push(result.rows_affected());
        }

        if !policy.allows(&counts) {
            tx.rollback().await?;
            warn!(rows = counts.len(), "Rolled back batch with a row that updated nothing");
            return Ok(counts);
        }

        tx.commit().await?;
        debug!(rows = counts.len(), "Committed batch");

        Ok(counts)
    }
}
