//! Engine controller
//!
//! [`TimelineEngine`] owns the stack of live timeline instances and the data
//! recorded so far. The host (or the async [`Executor`](crate::executor::Executor))
//! starts it with a root node, presents each [`ActiveTrial`] it hands out, and
//! reports completion. Between one trial and the next, the engine walks the
//! stack: popping exhausted timelines, instantiating nested ones, and asking
//! conditionals and loop predicates as it goes.
//!
//! Exactly one trial is active at a time. Mutations requested while a trial
//! is active (from hooks, or in the [`TrialCompletion`]) are applied before
//! the next trial is computed.

use crate::construction::ConstructionValidator;
use crate::cursor::{Step, TimelineInstance};
use crate::error::{EngineError, ScopeError};
use crate::events::{EngineEvent, EventJournal};
use crate::node::{NodeSpec, TimelineSpec, Trial};
use crate::scope::{self, VariableScope};
use crate::types::{DataLog, NodePath, Progress, TrialData, TrialRecord};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Seed for record sampling; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Keep an [`EventJournal`] of everything the engine does
    pub journal: bool,
    /// Reject a loop predicate combined with `repetitions > 1`
    pub strict_controls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            journal: true,
            strict_controls: false,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: bool) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn with_strict_controls(mut self, strict: bool) -> Self {
        self.strict_controls = strict;
        self
    }
}

/// The trial the host should present now
#[derive(Debug, Clone)]
pub struct ActiveTrial {
    /// Issue order, starting at 0
    pub trial_index: u64,
    pub path: NodePath,
    /// Parameters with inherited defaults applied and placeholders resolved
    pub params: Value,
    /// Scope the trial was issued in
    pub scope: VariableScope,
    trial: Arc<Trial>,
}

impl ActiveTrial {
    /// Parameters exactly as authored
    pub fn raw_params(&self) -> &Value {
        &self.trial.params
    }

    /// Shorthand for a top-level parameter
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// What the host reports when a trial ends
#[derive(Debug, Clone, Default)]
pub struct TrialCompletion {
    pub data: TrialData,
    /// Terminate the innermost timeline holding the trial
    pub terminate: bool,
    /// Nodes to add to the end of the root timeline
    pub append: Vec<NodeSpec>,
}

impl TrialCompletion {
    pub fn new(data: TrialData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn terminate_active_node(mut self) -> Self {
        self.terminate = true;
        self
    }

    #[must_use]
    pub fn append_node(mut self, node: impl Into<NodeSpec>) -> Self {
        self.append.push(node.into());
        self
    }
}

impl From<TrialData> for TrialCompletion {
    fn from(data: TrialData) -> Self {
        Self::new(data)
    }
}

/// Timeline engine controller
#[derive(Debug)]
pub struct TimelineEngine {
    config: EngineConfig,
    rng: StdRng,
    /// Live timeline instances, root first
    stack: Vec<TimelineInstance>,
    active: Option<ActiveTrial>,
    started: bool,
    data: DataLog,
    journal: EventJournal,
    next_trial_index: u64,
}

impl Default for TimelineEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TimelineEngine {
    pub fn new(config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let journal = EventJournal::new(config.journal);
        Self {
            config,
            rng,
            stack: Vec::new(),
            active: None,
            started: false,
            data: DataLog::new(),
            journal,
            next_trial_index: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate `root`, instantiate it and advance to the first trial.
    ///
    /// A bare trial is wrapped in a single-child timeline. Returns `None`
    /// when the tree yields no trials at all; the engine is then finished.
    pub fn start(&mut self, root: impl Into<NodeSpec>) -> Result<Option<ActiveTrial>, EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }

        let spec = match root.into() {
            NodeSpec::Timeline(spec) => spec,
            trial @ NodeSpec::Trial(_) => Arc::new(TimelineSpec::new(vec![trial])),
        };
        let report = ConstructionValidator::new()
            .strict(self.config.strict_controls)
            .validate(&NodeSpec::Timeline(Arc::clone(&spec)))?;
        for warning in &report.warnings {
            warn!(%warning, "conflicting timeline controls");
        }

        info!(
            trials = report.trial_count,
            timelines = report.timeline_count,
            depth = report.max_depth,
            "engine started"
        );
        self.started = true;
        let root = TimelineInstance::new(
            spec,
            NodePath::root(),
            &VariableScope::root(),
            &Map::new(),
            &mut self.rng,
        );
        self.stack.push(root);
        self.advance()?;
        Ok(self.active.clone())
    }

    pub fn active_trial(&self) -> Option<&ActiveTrial> {
        self.active.as_ref()
    }

    /// Record `data` for the active trial and advance
    pub fn complete_trial(&mut self, data: TrialData) -> Result<Option<ActiveTrial>, EngineError> {
        self.finish_trial(TrialCompletion::new(data))
    }

    /// Record a completion for the active trial, apply its requests, run the
    /// trial's `on_finish` hook, and advance to the next trial.
    pub fn finish_trial(
        &mut self,
        completion: TrialCompletion,
    ) -> Result<Option<ActiveTrial>, EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        let Some(active) = self.active.clone() else {
            return Err(EngineError::NoActiveTrial);
        };

        // A rejected append leaves the trial active and nothing recorded
        for node in &completion.append {
            self.check_node(node)?;
        }

        let record = TrialRecord {
            trial_index: active.trial_index,
            path: active.path.clone(),
            data: completion.data.clone(),
        };
        for frame in &mut self.stack {
            frame.record(&record);
        }
        self.data.push(record);
        info!(trial_index = active.trial_index, path = %active.path, "trial finished");
        self.journal.append(EngineEvent::TrialFinished {
            trial_index: active.trial_index,
            path: active.path.clone(),
        });

        if completion.terminate {
            self.terminate_active_node();
        }
        for node in completion.append {
            self.push_to_root(node);
        }

        if let Some(hook) = &active.trial.on_finish {
            let _span = info_span!("trial", trial_index = active.trial_index).entered();
            let mut control = EngineControl { engine: self };
            hook(&mut control, &completion.data)
                .map_err(|e| EngineError::from_callback(&active.path, e, EngineError::hook))?;
        }

        self.active = None;
        self.advance()?;
        Ok(self.active.clone())
    }

    /// Add `node` to the end of the root timeline.
    ///
    /// Takes effect when the root's cursor reaches it. After the run has
    /// finished this does nothing.
    pub fn append_node(&mut self, node: impl Into<NodeSpec>) -> Result<(), EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if self.stack.is_empty() {
            warn!("append after the timeline finished has no effect");
            return Ok(());
        }

        let node = node.into();
        self.check_node(&node)?;
        self.push_to_root(node);
        Ok(())
    }

    fn check_node(&self, node: &NodeSpec) -> Result<(), EngineError> {
        let report = ConstructionValidator::new()
            .strict(self.config.strict_controls)
            .validate_at(node, "appended")?;
        for warning in &report.warnings {
            warn!(%warning, "conflicting timeline controls");
        }
        Ok(())
    }

    fn push_to_root(&mut self, node: NodeSpec) {
        if let Some(root) = self.stack.first_mut() {
            let position = root.append_child(node);
            debug!(position, "node appended to root timeline");
            self.journal.append(EngineEvent::NodeAppended { position });
        }
    }

    /// Mark the innermost timeline holding the active trial as terminated.
    ///
    /// The active trial still completes; the timeline is exhausted on the
    /// next advance, skipping its remaining children, repetitions and copies.
    /// Without an active trial this does nothing.
    pub fn terminate_active_node(&mut self) {
        let Some(active) = &self.active else {
            warn!("terminate requested with no active trial");
            return;
        };
        if let Some(frame) = self.stack.last_mut() {
            debug!(trial_index = active.trial_index, path = %frame.path(), "timeline marked terminated");
            frame.terminate();
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.stack.is_empty() && self.active.is_none()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            trials_completed: self.data.count() as u64,
            active_trial: self.active.as_ref().map(|a| a.trial_index),
            finished: self.is_finished(),
        }
    }

    pub fn data(&self) -> &DataLog {
        &self.data
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Live timeline instances, root first
    pub fn frames(&self) -> &[TimelineInstance] {
        &self.stack
    }

    /// Hand the recorded data over, consuming the engine
    pub fn into_data(self) -> DataLog {
        self.data
    }

    /// Walk the stack until a trial is active or the root is exhausted
    fn advance(&mut self) -> Result<(), EngineError> {
        while self.active.is_none() {
            let Some(top) = self.stack.last_mut() else {
                info!(trials = self.data.count(), "timeline finished");
                self.journal.append(EngineEvent::Finished {
                    trials: self.data.count() as u64,
                });
                return Ok(());
            };

            match top.step(&self.data, &mut self.journal)? {
                Step::Exhausted => {
                    debug!(path = %top.path(), "timeline exhausted");
                    self.stack.pop();
                }
                Step::Descend { spec, path } => {
                    let scope = top.scope();
                    let defaults = top.defaults().clone();
                    let child = TimelineInstance::new(spec, path, &scope, &defaults, &mut self.rng);
                    self.stack.push(child);
                }
                Step::Trial { trial, path } => self.activate(trial, path)?,
            }
        }
        Ok(())
    }

    fn activate(&mut self, trial: Arc<Trial>, path: NodePath) -> Result<(), EngineError> {
        let (scope, params) = match self.stack.last() {
            Some(top) => {
                let scope = top.scope();
                let params = resolve_params(&trial.params, top.defaults(), &scope);
                (scope, params)
            }
            None => return Err(EngineError::NotStarted),
        };
        let params = params.map_err(|ScopeError::UndefinedVariable { name }| {
            EngineError::UndefinedVariable {
                name,
                path: path.clone(),
            }
        })?;

        let trial_index = self.next_trial_index;
        self.next_trial_index += 1;
        info!(trial_index, %path, "trial issued");
        self.journal.append(EngineEvent::TrialIssued {
            trial_index,
            path: path.clone(),
        });
        self.active = Some(ActiveTrial {
            trial_index,
            path: path.clone(),
            params,
            scope,
            trial: Arc::clone(&trial),
        });

        if let Some(hook) = &trial.on_start {
            let _span = info_span!("trial", trial_index).entered();
            let mut control = EngineControl { engine: self };
            hook(&mut control).map_err(|e| EngineError::from_callback(&path, e, EngineError::hook))?;
        }
        Ok(())
    }
}

/// Inherited defaults under the trial's own parameters, placeholders resolved
fn resolve_params(
    params: &Value,
    defaults: &Map<String, Value>,
    scope: &VariableScope,
) -> Result<Value, ScopeError> {
    let merged = match params {
        Value::Object(own) => {
            let mut merged = defaults.clone();
            for (key, value) in own {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        Value::Null if !defaults.is_empty() => Value::Object(defaults.clone()),
        other => other.clone(),
    };
    scope::substitute(&merged, scope)
}

/// Control surface handed to trial hooks
///
/// Borrows the engine for the duration of the hook. Requests made here are
/// applied before the next trial is computed.
pub struct EngineControl<'a> {
    engine: &'a mut TimelineEngine,
}

impl EngineControl<'_> {
    pub fn append_node(&mut self, node: impl Into<NodeSpec>) -> Result<(), EngineError> {
        self.engine.append_node(node)
    }

    pub fn terminate_active_node(&mut self) {
        self.engine.terminate_active_node();
    }

    pub fn data(&self) -> &DataLog {
        self.engine.data()
    }

    pub fn active_trial(&self) -> Option<&ActiveTrial> {
        self.engine.active_trial()
    }

    /// Scope of the active trial
    pub fn scope(&self) -> VariableScope {
        self.engine
            .active_trial()
            .map(|active| active.scope.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(label: &str) -> NodeSpec {
        Trial::new(json!({ "label": label })).into()
    }

    #[test]
    fn defaults_merge_under_trial_params() {
        let mut defaults = Map::new();
        defaults.insert("type".to_string(), json!("text"));
        defaults.insert("label".to_string(), json!("default"));
        let merged =
            resolve_params(&json!({"label": "own"}), &defaults, &VariableScope::root()).unwrap();
        assert_eq!(merged, json!({"type": "text", "label": "own"}));
    }

    #[test]
    fn scalar_params_skip_defaults() {
        let mut defaults = Map::new();
        defaults.insert("type".to_string(), json!("text"));
        let merged = resolve_params(&json!("plain"), &defaults, &VariableScope::root()).unwrap();
        assert_eq!(merged, json!("plain"));
        let merged = resolve_params(&Value::Null, &defaults, &VariableScope::root()).unwrap();
        assert_eq!(merged, json!({"type": "text"}));
    }

    #[test]
    fn bare_trial_is_wrapped() {
        let mut engine = TimelineEngine::new(EngineConfig::default().with_seed(1));
        let first = engine.start(leaf("only")).unwrap().unwrap();
        assert_eq!(first.param("label"), Some(&json!("only")));
        assert!(engine.complete_trial(json!({})).unwrap().is_none());
        assert!(engine.is_finished());
    }

    #[test]
    fn progress_tracks_active_and_completed() {
        let mut engine = TimelineEngine::new(EngineConfig::default().with_seed(1));
        engine
            .start(TimelineSpec::new(vec![leaf("a"), leaf("b")]))
            .unwrap();
        assert_eq!(
            engine.progress(),
            Progress {
                trials_completed: 0,
                active_trial: Some(0),
                finished: false
            }
        );
        engine.complete_trial(json!({})).unwrap();
        engine.complete_trial(json!({})).unwrap();
        assert_eq!(
            engine.progress(),
            Progress {
                trials_completed: 2,
                active_trial: None,
                finished: true
            }
        );
    }

    #[test]
    fn complete_without_start_fails() {
        let mut engine = TimelineEngine::default();
        assert!(matches!(
            engine.complete_trial(json!({})),
            Err(EngineError::NotStarted)
        ));
    }

    #[test]
    fn journal_can_be_disabled() {
        let mut engine = TimelineEngine::new(EngineConfig::default().with_journal(false));
        engine.start(leaf("a")).unwrap();
        engine.complete_trial(json!({})).unwrap();
        assert!(engine.journal().is_empty());
    }
}
