//! Error types for batch execution

use thiserror::Error;

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors raised while reading, processing or writing records
#[derive(Error, Debug)]
pub enum BatchError {
    /// Malformed input record at the source boundary
    #[error("Parse error at record {position}: {message}")]
    Parse { position: u64, message: String },

    /// A record's key has no match in the promoted lookup table
    #[error("No entry for key '{key}' in '{table}': [{record}]")]
    Correlation {
        key: String,
        table: String,
        record: String,
    },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The sink accepted the batch but one record affected no rows
    #[error("Item {index} of {total} did not update any rows: [{record}]")]
    WriteAssertion {
        index: usize,
        total: usize,
        record: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing execution context value '{key}'")]
    MissingContext { key: String },

    #[error("Job execution context already holds '{key}'")]
    ContextConflict { key: String },

    #[error("Skip limit of {limit} exceeded in step '{step}': {source}")]
    SkipLimitExceeded {
        step: String,
        limit: usize,
        #[source]
        source: Box<BatchError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a batch sink for a whole batch
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Sink returned {actual} update counts for {expected} statements")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Batch rejected: {0}")]
    Rejected(String),
}

/// Stable classification of a [`BatchError`], reported in job failure details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Correlation,
    Sink,
    WriteAssertion,
    Config,
    MissingContext,
    ContextConflict,
    SkipLimitExceeded,
    Serialization,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Correlation => "correlation",
            ErrorKind::Sink => "sink",
            ErrorKind::WriteAssertion => "write_assertion",
            ErrorKind::Config => "config",
            ErrorKind::MissingContext => "missing_context",
            ErrorKind::ContextConflict => "context_conflict",
            ErrorKind::SkipLimitExceeded => "skip_limit_exceeded",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::Parse { .. } => ErrorKind::Parse,
            BatchError::Correlation { .. } => ErrorKind::Correlation,
            BatchError::Sink(_) => ErrorKind::Sink,
            BatchError::WriteAssertion { .. } => ErrorKind::WriteAssertion,
            BatchError::Config(_) => ErrorKind::Config,
            BatchError::MissingContext { .. } => ErrorKind::MissingContext,
            BatchError::ContextConflict { .. } => ErrorKind::ContextConflict,
            BatchError::SkipLimitExceeded { .. } => ErrorKind::SkipLimitExceeded,
            BatchError::Serialization(_) => ErrorKind::Serialization,
            BatchError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether a fault-tolerant step may skip the record that raised this error
    ///
    /// Only malformed input qualifies. Correlation and write assertion
    /// failures point at a data or logic defect and always fail the step.
    pub fn is_skippable(&self) -> bool {
        matches!(self, BatchError::Parse { .. })
    }
}
