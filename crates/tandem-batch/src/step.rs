//! Chunk-oriented steps
//!
//! A [`ChunkStep`] drains one reader through one processor into one writer,
//! `chunk_size` records per write. Malformed input may be skipped when the
//! step is fault tolerant; every other error fails the step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::chunk::ChunkAccumulator;
use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_SKIP_LIMIT};
use crate::context::ExecutionContext;
use crate::error::{BatchError, Result};
use crate::processor::ItemProcessor;
use crate::source::{ChunkReader, RecordSource};
use crate::writer::ItemWriter;

/// Per-step settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Records per write
    pub chunk_size: usize,
    /// Skip malformed records instead of failing
    pub fault_tolerant: bool,
    /// Skips allowed before a fault-tolerant step fails
    pub skip_limit: usize,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fault_tolerant: false,
            skip_limit: DEFAULT_SKIP_LIMIT,
        }
    }
}

impl StepConfig {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    pub fn fault_tolerant(chunk_size: usize, skip_limit: usize) -> Self {
        Self {
            chunk_size,
            fault_tolerant: true,
            skip_limit,
        }
    }

    pub fn validate(&self, step: &str) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BatchError::Config(format!(
                "{}: chunk_size must be greater than 0",
                step
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Starting,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Starting => "starting",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome and counters of one step run
#[derive(Debug)]
pub struct StepExecution {
    pub step_name: String,
    pub status: StepStatus,
    pub read_count: u64,
    pub write_count: u64,
    /// Records the processor dropped
    pub filter_count: u64,
    pub read_skip_count: u64,
    pub process_skip_count: u64,
    /// Chunks written successfully
    pub commit_count: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Step-scoped context, populated by the writer on success
    pub context: ExecutionContext,
    pub failure: Option<BatchError>,
    /// Input position of the record that failed the step, when one did
    pub failure_position: Option<u64>,
}

impl StepExecution {
    pub fn start(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Starting,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            read_skip_count: 0,
            process_skip_count: 0,
            commit_count: 0,
            start_time: Utc::now(),
            end_time: None,
            context: ExecutionContext::new(),
            failure: None,
            failure_position: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count
    }

    fn complete(&mut self) {
        self.status = StepStatus::Completed;
        self.end_time = Some(Utc::now());
        info!(
            step = %self.step_name,
            read = self.read_count,
            written = self.write_count,
            filtered = self.filter_count,
            skipped = self.skip_count(),
            commits = self.commit_count,
            "Step completed"
        );
    }

    fn fail(&mut self, err: BatchError) {
        error!(
            step = %self.step_name,
            kind = %err.kind(),
            error = %err,
            read = self.read_count,
            commits = self.commit_count,
            "Step failed"
        );
        self.status = StepStatus::Failed;
        self.end_time = Some(Utc::now());
        self.failure = Some(err);
    }
}

#[async_trait]
pub trait Step: Send {
    fn name(&self) -> &str;

    /// Run to completion; failures are reported on the returned execution
    async fn execute(&mut self) -> StepExecution;
}

/// Decides whether a failed record may be skipped
struct SkipPolicy {
    enabled: bool,
    limit: usize,
    skipped: usize,
}

impl SkipPolicy {
    fn new(config: &StepConfig) -> Self {
        Self {
            enabled: config.fault_tolerant,
            limit: config.skip_limit,
            skipped: 0,
        }
    }

    /// `Ok` when the record was skipped; otherwise the error that fails the step
    fn skip(&mut self, step: &str, err: BatchError) -> Result<()> {
        if !self.enabled || !err.is_skippable() {
            return Err(err);
        }

        if self.skipped >= self.limit {
            return Err(BatchError::SkipLimitExceeded {
                step: step.to_string(),
                limit: self.limit,
                source: Box::new(err),
            });
        }

        self.skipped += 1;
        warn!(
            step = %step,
            skipped = self.skipped,
            limit = self.limit,
            error = %err,
            "Skipping record"
        );
        Ok(())
    }
}

/// Read, process and write in chunks
pub struct ChunkStep<S, P, W> {
    name: String,
    config: StepConfig,
    reader: ChunkReader<S>,
    processor: P,
    writer: W,
}

impl<S, P, W> ChunkStep<S, P, W>
where
    S: RecordSource,
    P: ItemProcessor<S::Item>,
    W: ItemWriter<P::Output>,
{
    pub fn new(name: impl Into<String>, config: StepConfig, source: S, processor: P, writer: W) -> Self {
        Self {
            name: name.into(),
            config,
            reader: ChunkReader::new(source),
            processor,
            writer,
        }
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    async fn run(&mut self, execution: &mut StepExecution) -> Result<()> {
        let Self {
            name,
            config,
            reader,
            processor,
            writer,
        } = self;

        config.validate(name)?;

        let mut skips = SkipPolicy::new(config);
        let mut chunk = ChunkAccumulator::new(writer, config.chunk_size);

        let outcome = drain(name, reader, processor, &mut chunk, &mut skips, execution).await;

        execution.commit_count = chunk.flushes();
        execution.write_count = chunk.written();
        outcome
    }
}

async fn drain<S, P, W>(
    name: &str,
    reader: &mut ChunkReader<S>,
    processor: &P,
    chunk: &mut ChunkAccumulator<'_, P::Output, W>,
    skips: &mut SkipPolicy,
    execution: &mut StepExecution,
) -> Result<()>
where
    S: RecordSource,
    P: ItemProcessor<S::Item>,
    W: ItemWriter<P::Output>,
{
    loop {
        let item = match reader.read() {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(err) => {
                let position = reader.position();
                skips
                    .skip(name, err)
                    .inspect_err(|_| execution.failure_position = Some(position))?;
                execution.read_skip_count += 1;
                continue;
            },
        };
        execution.read_count += 1;

        match processor.process(item) {
            Ok(Some(output)) => chunk.add(output).await?,
            Ok(None) => execution.filter_count += 1,
            Err(err) => {
                let position = reader.position();
                skips
                    .skip(name, err)
                    .inspect_err(|_| execution.failure_position = Some(position))?;
                execution.process_skip_count += 1;
            },
        }
    }

    chunk.flush().await
}

#[async_trait]
impl<S, P, W> Step for ChunkStep<S, P, W>
where
    S: RecordSource,
    P: ItemProcessor<S::Item>,
    W: ItemWriter<P::Output>,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(step = %self.name))]
    async fn execute(&mut self) -> StepExecution {
        let mut execution = StepExecution::start(self.name.clone());
        info!(
            chunk_size = self.config.chunk_size,
            fault_tolerant = self.config.fault_tolerant,
            "Starting step"
        );

        let outcome = match self.run(&mut execution).await {
            Ok(()) => self.writer.update(&mut execution.context),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => execution.complete(),
            Err(err) => execution.fail(err),
        }
        execution
    }
}
