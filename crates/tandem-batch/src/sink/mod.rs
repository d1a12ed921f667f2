//! Batch sinks: execute one parameterized statement for many rows at once
//!
//! A sink receives statements whose placeholders are already numbered
//! (`$1`, `$2`, ...) together with one ordered parameter list per row, and
//! answers with the affected-row count of every row in the same order.

pub mod memory;
pub mod database;

pub use self::memory::{ExecutedBatch, MemorySink};
pub use self::database::SqlxBatchSink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SinkError;

/// A single bound parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Convert a JSON scalar; arrays and objects are rendered as JSON text
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Text)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// Ordered parameter values for one row
pub type RowBinding = Vec<SqlValue>;

/// When a sink may make an executed batch durable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Commit once every row has executed
    #[default]
    Always,
    /// Commit only if every row affected at least one row; otherwise
    /// discard the whole batch and still report the counts
    RequireUpdates,
}

impl CommitPolicy {
    pub fn allows(self, counts: &[u64]) -> bool {
        match self {
            CommitPolicy::Always => true,
            CommitPolicy::RequireUpdates => counts.iter().all(|&count| count > 0),
        }
    }
}

#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Execute `sql` once per binding as a single batch
    ///
    /// Returns one affected-row count per binding, in binding order. A
    /// failure rejects the batch as a whole. Under
    /// [`CommitPolicy::RequireUpdates`] a batch with a zero count is discarded
    /// before it becomes durable, and its counts are returned so the caller
    /// can report the offending row.
    async fn execute_batch(
        &self,
        sql: &str,
        bindings: Vec<RowBinding>,
        policy: CommitPolicy,
    ) -> Result<Vec<u64>, SinkError>;
}
