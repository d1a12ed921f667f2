//! In-process sink that records every batch it is handed

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BatchSink, CommitPolicy, RowBinding, SqlValue};
use crate::error::SinkError;

type OutcomeFn = dyn Fn(&[SqlValue]) -> u64 + Send + Sync;

/// A batch as the sink received it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedBatch {
    pub sql: String,
    pub bindings: Vec<RowBinding>,
}

/// Records batches instead of executing them
///
/// By default every row reports one affected row. [`MemorySink::with_outcome`]
/// decides the count per row, [`MemorySink::rejecting`] refuses every batch.
/// Batches the [`CommitPolicy`] refuses are not recorded.
pub struct MemorySink {
    batches: Mutex<Vec<ExecutedBatch>>,
    outcome: Box<OutcomeFn>,
    reject: Option<String>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_outcome(|_| 1)
    }

    pub fn with_outcome<F>(outcome: F) -> Self
    where
        F: Fn(&[SqlValue]) -> u64 + Send + Sync + 'static,
    {
        Self {
            batches: Mutex::new(Vec::new()),
            outcome: Box::new(outcome),
            reject: None,
        }
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            reject: Some(reason.into()),
            ..Self::new()
        }
    }

    pub async fn batches(&self) -> Vec<ExecutedBatch> {
        self.batches.lock().await.clone()
    }

    /// Every accepted row across all batches, in execution order
    pub async fn rows(&self) -> Vec<RowBinding> {
        self.batches
            .lock()
            .await
            .iter()
            .flat_map(|batch| batch.bindings.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn execute_batch(
        &self,
        sql: &str,
        bindings: Vec<RowBinding>,
        policy: CommitPolicy,
    ) -> Result<Vec<u64>, SinkError> {
        if let Some(reason) = &self.reject {
            return Err(SinkError::Rejected(reason.clone()));
        }

        let counts: Vec<u64> = bindings.iter().map(|row| (self.outcome)(row)).collect();
        if !policy.allows(&counts) {
            debug!(rows = bindings.len(), "Discarded batch");
            return Ok(counts);
        }
        debug!(rows = bindings.len(), "Recorded batch");

        self.batches.lock().await.push(ExecutedBatch {
            sql: sql.to_string(),
            bindings,
        });

        Ok(counts)
    }
}
