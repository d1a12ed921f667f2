//! Tandem Batch
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A two-stage, chunk-oriented batch pipeline. Stage 1 reads records into an
//! in-memory lookup table; the table is promoted into the job context; stage
//! 2 correlates a second input against it and writes merged records to a SQL
//! database in batches, asserting that every record took effect.
//!
//! # Building blocks
//!
//! - [`source`]: record sources (CSV, in-memory) and the fused chunk reader
//! - [`processor`]: normalization and correlation
//! - [`chunk`]: chunk accumulation
//! - [`writer`]: in-memory and batch SQL writers
//! - [`sink`]: batch sinks (sqlx `AnyPool`, in-memory)
//! - [`context`]: step and job execution contexts, promotion
//! - [`step`]: chunk-oriented steps with skip handling
//! - [`job`]: the two-step pipeline engine
//! - [`people`]: the reference people job
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_batch::config::JobConfig;
//! use tandem_batch::people::{csv_sources, run_people_job};
//! use tandem_batch::sink::SqlxBatchSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = JobConfig::load(None)?;
//!     let sink = SqlxBatchSink::connect(&config.database).await?;
//!     let (names, ages) = csv_sources(&config)?;
//!
//!     let job = run_people_job(&config, names, ages, Arc::new(sink)).await?;
//!     std::process::exit(job.exit_code());
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod people;
pub mod processor;
pub mod record;
pub mod sink;
pub mod source;
pub mod step;
pub mod writer;

pub use context::{ContextPromotion, ExecutionContext, JobExecutionContext};
pub use error::{BatchError, ErrorKind, Result, SinkError};
pub use job::{JobExecution, JobFailure, Pipeline, PipelineState};
pub use record::Person;
pub use step::{ChunkStep, Step, StepConfig, StepExecution, StepStatus};
