//! Two-step pipeline engine
//!
//! Runs step 1, promotes selected values of its context into the job
//! context, builds step 2 from that job context and runs it. A failed step 1
//! never lets step 2 start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, instrument};

use crate::context::{ContextPromotion, JobExecutionContext};
use crate::error::{BatchError, ErrorKind, Result};
use crate::step::{Step, StepExecution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Step1Running,
    Step1Done,
    Step2Running,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::NotStarted => "not_started",
            PipelineState::Step1Running => "step1_running",
            PipelineState::Step1Done => "step1_done",
            PipelineState::Step2Running => "step2_running",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        }
    }

    /// `Step1Done -> Failed` covers a promotion that could not be applied
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, next),
            (NotStarted, Step1Running)
                | (Step1Running, Step1Done)
                | (Step1Running, Failed)
                | (Step1Done, Step2Running)
                | (Step1Done, Failed)
                | (Step2Running, Completed)
                | (Step2Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First fatal error of a job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Step the error belongs to
    pub step: String,
    pub kind: ErrorKind,
    /// Input position of the offending record, when the error came from one
    pub position: Option<u64>,
    pub message: String,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed with {}", self.step, self.kind)?;
        if let Some(position) = self.position {
            write!(f, " at record {}", position)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct JobExecution {
    pub job_name: String,
    pub state: PipelineState,
    /// Every state entered, starting with `NotStarted`
    pub history: Vec<PipelineState>,
    pub steps: Vec<StepExecution>,
    pub context: JobExecutionContext,
    pub failure: Option<JobFailure>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl JobExecution {
    fn new(job_name: String) -> Self {
        Self {
            job_name,
            state: PipelineState::NotStarted,
            history: vec![PipelineState::NotStarted],
            steps: Vec::new(),
            context: JobExecutionContext::new(),
            failure: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == PipelineState::Completed
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    /// Human-readable description of the failure, if any
    pub fn failure_detail(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Process exit status for this run
    pub fn exit_code(&self) -> i32 {
        if self.is_completed() {
            0
        } else {
            1
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid pipeline transition {} -> {}",
            self.state,
            next
        );
        debug!(job = %self.job_name, from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
        self.history.push(next);
    }

    /// Record a finished step; returns whether it completed
    fn record_step(&mut self, mut execution: StepExecution) -> bool {
        let completed = execution.is_completed();
        if !completed {
            let failure = match execution.failure.as_ref() {
                Some(err) => JobFailure {
                    step: execution.step_name.clone(),
                    kind: err.kind(),
                    position: execution.failure_position,
                    message: err.to_string(),
                },
                None => JobFailure {
                    step: execution.step_name.clone(),
                    kind: ErrorKind::Config,
                    position: None,
                    message: format!("step ended in state {}", execution.status),
                },
            };
            self.failure = Some(failure);
            execution.end_time.get_or_insert_with(Utc::now);
        }
        self.steps.push(execution);
        completed
    }

    fn fail(&mut self, step: &str, err: &BatchError) {
        error!(job = %self.job_name, step = %step, kind = %err.kind(), error = %err, "Job failed");
        self.failure = Some(JobFailure {
            step: step.to_string(),
            kind: err.kind(),
            position: None,
            message: err.to_string(),
        });
        self.finish(PipelineState::Failed);
    }

    fn finish(&mut self, state: PipelineState) {
        self.transition(state);
        self.end_time = Some(Utc::now());

        match &self.failure {
            None => info!(job = %self.job_name, steps = self.steps.len(), "Job completed"),
            Some(failure) => error!(job = %self.job_name, failure = %failure, "Job finished with failure"),
        }
    }
}

/// Step 1, the promotion bridging it to step 2, and the step 2 factory
///
/// Step 2 is built only after promotion, from the job context, so it can
/// bind whatever step 1 published.
pub struct Pipeline<S1, F> {
    name: String,
    first: S1,
    promotion: ContextPromotion,
    second_name: String,
    second: F,
}

impl<S1, S2, F> Pipeline<S1, F>
where
    S1: Step,
    S2: Step,
    F: FnOnce(&JobExecutionContext) -> Result<S2> + Send,
{
    pub fn new(name: impl Into<String>, first: S1, second_name: impl Into<String>, second: F) -> Self {
        Self {
            name: name.into(),
            first,
            promotion: ContextPromotion::default(),
            second_name: second_name.into(),
            second,
        }
    }

    pub fn promotion(mut self, promotion: ContextPromotion) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(job = %self.name))]
    pub async fn run(self) -> JobExecution {
        let Self {
            name,
            mut first,
            promotion,
            second_name,
            second,
        } = self;

        let mut job = JobExecution::new(name);
        info!(first = %first.name(), second = %second_name, "Starting job");

        job.transition(PipelineState::Step1Running);
        let first_execution = first.execute().await;
        let first_name = first_execution.step_name.clone();

        // Promotion reads the step context, so it runs before the execution is recorded
        let promoted = first_execution
            .is_completed()
            .then(|| promotion.promote(&first_execution.context, &mut job.context));

        if !job.record_step(first_execution) {
            job.finish(PipelineState::Failed);
            return job;
        }
        job.transition(PipelineState::Step1Done);

        match promoted {
            Some(Ok(count)) => debug!(promoted = count, "Promoted step context to job context"),
            Some(Err(err)) => {
                job.fail(&first_name, &err);
                return job;
            },
            None => {},
        }

        job.transition(PipelineState::Step2Running);
        let mut second = match second(&job.context) {
            Ok(step) => step,
            Err(err) => {
                job.fail(&second_name, &err);
                return job;
            },
        };

        let second_execution = second.execute().await;
        if job.record_step(second_execution) {
            job.finish(PipelineState::Completed);
        } else {
            job.finish(PipelineState::Failed);
        }
        job
    }
}
