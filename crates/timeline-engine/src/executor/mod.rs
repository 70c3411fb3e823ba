//! Async run driver
//!
//! The engine itself is synchronous: it hands out one trial and waits to be
//! told how it ended. [`Executor`] closes that loop against a
//! [`TrialRunner`], which is where presentation actually happens (a UI, a
//! network client, a scripted responder in tests).

use crate::engine::{ActiveTrial, TimelineEngine, TrialCompletion};
use crate::error::EngineError;
use crate::node::NodeSpec;
use crate::types::{RunId, TrialRecord};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Presents trials and reports how they ended
#[async_trait::async_trait]
pub trait TrialRunner: Send {
    /// Present `trial` and wait for it to finish
    async fn execute_trial(&mut self, trial: &ActiveTrial) -> Result<TrialCompletion, RunnerError>;
}

/// Runner-side failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("trial {trial_index} failed: {message}")]
    TrialFailed { trial_index: u64, message: String },

    #[error("runner unavailable: {0}")]
    Unavailable(String),
}

/// Why a run stopped early
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("trial budget of {0} exhausted before the timeline finished")]
    TrialBudgetExceeded(u64),
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Trials executed by this call
    pub trials_executed: u64,
    pub finished: bool,
    /// Every record the engine holds, in completion order
    pub records: Vec<TrialRecord>,
    pub elapsed_ms: u64,
}

/// Drives a [`TimelineEngine`] against a [`TrialRunner`]
pub struct Executor<R> {
    runner: R,
    max_trials: Option<u64>,
}

impl<R: TrialRunner> Executor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            max_trials: None,
        }
    }

    /// Stop with [`RunError::TrialBudgetExceeded`] after `max` trials
    #[must_use]
    pub fn with_max_trials(mut self, max: u64) -> Self {
        self.max_trials = Some(max);
        self
    }

    /// Start `engine` on `root` and run it until the root is exhausted
    ///
    /// # Errors
    /// Returns [`RunError`] if:
    /// - the tree is invalid or a predicate or hook fails
    /// - the runner fails a trial
    /// - the trial budget runs out first
    pub async fn run(
        &mut self,
        engine: &mut TimelineEngine,
        root: impl Into<NodeSpec>,
    ) -> Result<RunSummary, RunError> {
        let first = engine.start(root)?;
        self.drive(engine, first).await
    }

    /// Continue an engine that is already started
    pub async fn resume(&mut self, engine: &mut TimelineEngine) -> Result<RunSummary, RunError> {
        if !engine.is_started() {
            return Err(EngineError::NotStarted.into());
        }
        let next = engine.active_trial().cloned();
        self.drive(engine, next).await
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    async fn drive(
        &mut self,
        engine: &mut TimelineEngine,
        mut next: Option<ActiveTrial>,
    ) -> Result<RunSummary, RunError> {
        let run_id = RunId::new();
        let start_time = Instant::now();
        let mut executed = 0u64;
        info!(%run_id, "run started");

        while let Some(trial) = next {
            if let Some(max) = self.max_trials {
                if executed >= max {
                    warn!(%run_id, max, "trial budget exhausted");
                    return Err(RunError::TrialBudgetExceeded(max));
                }
            }
            let completion = self.runner.execute_trial(&trial).await?;
            executed += 1;
            next = engine.finish_trial(completion)?;
        }

        let elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(%run_id, trials = executed, elapsed_ms, "run finished");
        Ok(RunSummary {
            run_id,
            trials_executed: executed,
            finished: engine.is_finished(),
            records: engine.data().records().to_vec(),
            elapsed_ms,
        })
    }
}
