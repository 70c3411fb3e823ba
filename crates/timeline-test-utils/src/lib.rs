//! Testing utilities for the trial timeline workspace
//!
//! Shared fixtures, scripted runners and drive loops.

#![allow(missing_docs)]

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use timeline_engine::engine::{ActiveTrial, EngineConfig, TimelineEngine, TrialCompletion};
use timeline_engine::error::EngineError;
use timeline_engine::executor::{RunnerError, TrialRunner};
use timeline_engine::node::{NodeSpec, Trial};
use timeline_engine::predicate::Predicate;
use timeline_engine::types::VariableRecord;

/// Trial whose `stimulus` parameter is `label`
pub fn trial(label: &str) -> Trial {
    Trial::new(json!({ "stimulus": label }))
}

/// Trial node whose `stimulus` parameter is `label`
pub fn leaf(label: &str) -> NodeSpec {
    trial(label).into()
}

/// Trial node whose `stimulus` is the variable `name`
pub fn var_leaf(name: &str) -> NodeSpec {
    Trial::new(json!({ "stimulus": { "$var": name } })).into()
}

/// The resolved `stimulus` parameter of a trial, as text
pub fn stimulus(trial: &ActiveTrial) -> String {
    match trial.param("stimulus") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// One record per value, each binding `name`
pub fn records(name: &str, values: &[Value]) -> Vec<VariableRecord> {
    values
        .iter()
        .map(|value| {
            let mut record = VariableRecord::new();
            record.insert(name.to_string(), value.clone());
            record
        })
        .collect()
}

/// Engine with a fixed seed and the journal on
pub fn seeded_engine(seed: u64) -> TimelineEngine {
    TimelineEngine::new(EngineConfig::default().with_seed(seed))
}

/// Start `engine` on `root` and answer every trial with `respond`
///
/// Returns the stimuli in the order they were presented.
pub fn run_to_end<F>(
    engine: &mut TimelineEngine,
    root: impl Into<NodeSpec>,
    mut respond: F,
) -> Result<Vec<String>, EngineError>
where
    F: FnMut(&ActiveTrial) -> TrialCompletion,
{
    let mut seen = Vec::new();
    let mut next = engine.start(root)?;
    while let Some(trial) = next {
        seen.push(stimulus(&trial));
        next = engine.finish_trial(respond(&trial))?;
    }
    Ok(seen)
}

/// Run `root` on a fresh seeded engine, answering every trial with `{}`
pub fn stimuli(root: impl Into<NodeSpec>) -> Result<Vec<String>, EngineError> {
    run_to_end(&mut seeded_engine(0), root, |_| TrialCompletion::new(json!({})))
}

/// Runner that answers from a queue and records what it was shown
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: VecDeque<TrialCompletion>,
    fail_on: Option<u64>,
    pub seen: Vec<ActiveTrial>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue completions; once empty, trials are answered with `{}`
    pub fn with_responses(responses: impl IntoIterator<Item = TrialCompletion>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Fail the trial with this index
    #[must_use]
    pub fn failing_on(mut self, trial_index: u64) -> Self {
        self.fail_on = Some(trial_index);
        self
    }

    pub fn stimuli(&self) -> Vec<String> {
        self.seen.iter().map(stimulus).collect()
    }
}

#[async_trait::async_trait]
impl TrialRunner for ScriptedRunner {
    async fn execute_trial(&mut self, trial: &ActiveTrial) -> Result<TrialCompletion, RunnerError> {
        self.seen.push(trial.clone());
        if self.fail_on == Some(trial.trial_index) {
            return Err(RunnerError::TrialFailed {
                trial_index: trial.trial_index,
                message: "scripted failure".to_string(),
            });
        }
        Ok(self
            .responses
            .pop_front()
            .unwrap_or_else(|| TrialCompletion::new(json!({}))))
    }
}

/// Predicate returning `answers` in turn (then `false`), with a call counter
pub fn scripted_predicate(answers: Vec<bool>) -> (Predicate, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let predicate = Predicate::custom(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(answers.get(n).copied().unwrap_or(false))
    });
    (predicate, calls)
}

/// Predicate that counts its calls and always returns `answer`
pub fn counting_predicate(answer: bool) -> (Predicate, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let predicate = Predicate::custom(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(answer)
    });
    (predicate, calls)
}
