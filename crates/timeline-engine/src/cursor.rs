//! Traversal cursors and live timeline instances
//!
//! Every instantiated interior node becomes a [`TimelineInstance`]: its spec,
//! its expansion copies, and the [`TraversalCursor`] that walks them. The
//! engine keeps instances on a stack, innermost last, and calls
//! [`TimelineInstance::step`] on the top one until it hands out a trial.

use crate::error::EngineError;
use crate::events::{EngineEvent, EventJournal};
use crate::expansion::{self, ExpansionCopy};
use crate::node::{NodeSpec, TimelineSpec, Trial};
use crate::predicate::PredicateInput;
use crate::scope::VariableScope;
use crate::state_machine::{validate_transition, IllegalTransition, NodeState};
use crate::types::{DataLog, NodePath, PathSegment, TrialRecord};
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Position of one timeline instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraversalCursor {
    pub copy_index: usize,
    /// Completed passes over the children of the current copy
    pub repetition: u32,
    /// Next child to hand out
    pub child_index: usize,
    pub terminated: bool,
    pub state: NodeState,
}

impl TraversalCursor {
    fn new() -> Self {
        Self {
            copy_index: 0,
            repetition: 0,
            child_index: 0,
            terminated: false,
            state: NodeState::Gating,
        }
    }

    fn transition(&mut self, to: NodeState) -> Result<(), IllegalTransition> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }

    /// Rewind onto copy `index`; a reset, not a transition
    fn begin_copy(&mut self, index: usize) {
        self.copy_index = index;
        self.repetition = 0;
        self.child_index = 0;
        self.state = NodeState::Gating;
    }
}

/// What the top instance produced
#[derive(Debug)]
pub(crate) enum Step {
    /// A leaf to activate, with its location
    Trial { trial: Arc<Trial>, path: NodePath },
    /// An interior child to instantiate and push
    Descend {
        spec: Arc<TimelineSpec>,
        path: NodePath,
    },
    Exhausted,
}

/// A live interior node
#[derive(Debug)]
pub struct TimelineInstance {
    spec: Arc<TimelineSpec>,
    path: NodePath,
    copies: Vec<ExpansionCopy>,
    cursor: TraversalCursor,
    /// Trial defaults from this node and every ancestor, innermost applied last
    defaults: Map<String, Value>,
    /// Records of the current pass, kept only when there is a loop predicate
    iteration: Vec<TrialRecord>,
}

impl TimelineInstance {
    /// Instantiate `spec` below `parent_scope`, expanding its records once
    pub(crate) fn new<R: Rng + ?Sized>(
        spec: Arc<TimelineSpec>,
        path: NodePath,
        parent_scope: &VariableScope,
        parent_defaults: &Map<String, Value>,
        rng: &mut R,
    ) -> Self {
        let copies = expansion::expand(&spec, parent_scope, rng);
        let mut defaults = parent_defaults.clone();
        for (key, value) in &spec.defaults {
            defaults.insert(key.clone(), value.clone());
        }
        debug!(%path, copies = copies.len(), "instantiated timeline");
        Self {
            spec,
            path,
            copies,
            cursor: TraversalCursor::new(),
            defaults,
            iteration: Vec::new(),
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn cursor(&self) -> &TraversalCursor {
        &self.cursor
    }

    /// Children in this node's sequence, appended ones included
    pub fn child_count(&self) -> usize {
        self.spec.children.len()
    }

    pub fn copy_count(&self) -> usize {
        self.copies.len()
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.state == NodeState::Exhausted
    }

    /// Scope of the copy currently being walked
    ///
    /// Once every copy is used up this falls back to the last one, or to an
    /// empty scope when the node expanded to nothing.
    pub fn scope(&self) -> VariableScope {
        self.copies
            .get(self.cursor.copy_index)
            .or_else(|| self.copies.last())
            .map(|copy| copy.scope.clone())
            .unwrap_or_default()
    }

    pub(crate) fn terminate(&mut self) {
        self.cursor.terminated = true;
    }

    pub(crate) fn record(&mut self, record: &TrialRecord) {
        if self.spec.loop_predicate.is_some() {
            self.iteration.push(record.clone());
        }
    }

    /// Add a child at the end of this node's sequence; returns its index
    pub(crate) fn append_child(&mut self, node: NodeSpec) -> usize {
        let children = &mut Arc::make_mut(&mut self.spec).children;
        children.push(node);
        children.len() - 1
    }

    /// Advance until a child is handed out or the node is exhausted
    pub(crate) fn step(
        &mut self,
        data: &DataLog,
        journal: &mut EventJournal,
    ) -> Result<Step, EngineError> {
        loop {
            match self.cursor.state {
                NodeState::Exhausted => return Ok(Step::Exhausted),
                NodeState::Gating => self.gate(data, journal)?,
                NodeState::Active => {
                    if self.cursor.terminated {
                        debug!(path = %self.path, "timeline terminated");
                        journal.append(EngineEvent::TimelineTerminated {
                            path: self.path.clone(),
                        });
                        self.fire_finish();
                        self.cursor.transition(NodeState::Exhausted)?;
                        continue;
                    }
                    if let Some(step) = self.next_child() {
                        return Ok(step);
                    }
                    self.end_pass(journal)?;
                }
            }
        }
    }

    fn gate(&mut self, data: &DataLog, journal: &mut EventJournal) -> Result<(), EngineError> {
        let copy_index = self.cursor.copy_index;
        let Some(copy) = self.copies.get(copy_index) else {
            self.cursor.transition(NodeState::Exhausted)?;
            return Ok(());
        };
        if self.cursor.terminated {
            self.cursor.transition(NodeState::Exhausted)?;
            return Ok(());
        }

        let admitted = match &self.spec.conditional {
            None => true,
            Some(predicate) => predicate
                .evaluate(&PredicateInput {
                    scope: &copy.scope,
                    data: data.records(),
                    iteration: 0,
                })
                .map_err(|e| EngineError::from_callback(&self.path, e, EngineError::predicate))?,
        };

        if admitted {
            debug!(path = %self.path, copy = copy_index, "timeline entered");
            journal.append(EngineEvent::TimelineEntered {
                path: self.path.clone(),
                copy: copy_index,
            });
            if let Some(hook) = &self.spec.on_timeline_start {
                hook(&copy.scope);
            }
            self.iteration.clear();
            self.cursor.transition(NodeState::Active)?;
        } else {
            debug!(path = %self.path, copy = copy_index, "timeline skipped by conditional");
            journal.append(EngineEvent::TimelineSkipped {
                path: self.path.clone(),
                copy: copy_index,
            });
            self.next_copy_or_exhaust()?;
        }
        Ok(())
    }

    fn next_child(&mut self) -> Option<Step> {
        let index = self.cursor.child_index;
        let child = self.spec.children.get(index)?;
        self.cursor.child_index += 1;
        let path = self.path.child(PathSegment {
            child: index,
            copy: self.cursor.copy_index,
            repetition: self.cursor.repetition,
        });
        Some(match child {
            NodeSpec::Trial(trial) => Step::Trial {
                trial: Arc::clone(trial),
                path,
            },
            NodeSpec::Timeline(spec) => Step::Descend {
                spec: Arc::clone(spec),
                path,
            },
        })
    }

    /// Children of the current pass are used up: loop, repeat, or move on
    fn end_pass(&mut self, journal: &mut EventJournal) -> Result<(), EngineError> {
        self.cursor.repetition += 1;

        let again = match &self.spec.loop_predicate {
            Some(predicate) => {
                let scope = self.scope();
                let again = predicate
                    .evaluate(&PredicateInput {
                        scope: &scope,
                        data: &self.iteration,
                        iteration: self.cursor.repetition,
                    })
                    .map_err(|e| {
                        EngineError::from_callback(&self.path, e, EngineError::predicate)
                    })?;
                if again && self.iteration.is_empty() {
                    return Err(EngineError::EmptyLoop {
                        path: self.path.clone(),
                    });
                }
                if again {
                    debug!(path = %self.path, iteration = self.cursor.repetition, "loop re-entered");
                    journal.append(EngineEvent::LoopReentered {
                        path: self.path.clone(),
                        iteration: self.cursor.repetition,
                    });
                }
                again
            }
            None => self.cursor.repetition < self.spec.repetitions,
        };

        if again {
            self.cursor.child_index = 0;
            self.iteration.clear();
            return Ok(());
        }

        self.fire_finish();
        self.next_copy_or_exhaust()
    }

    fn next_copy_or_exhaust(&mut self) -> Result<(), EngineError> {
        let next = self.cursor.copy_index + 1;
        if next < self.copies.len() {
            self.cursor.begin_copy(next);
            Ok(())
        } else {
            Ok(self.cursor.transition(NodeState::Exhausted)?)
        }
    }

    fn fire_finish(&self) {
        if let (Some(hook), Some(copy)) = (
            &self.spec.on_timeline_finish,
            self.copies.get(self.cursor.copy_index),
        ) {
            hook(&copy.scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::PredicateSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn instance(spec: TimelineSpec) -> TimelineInstance {
        TimelineInstance::new(
            Arc::new(spec),
            NodePath::root(),
            &VariableScope::root(),
            &Map::new(),
            &mut StdRng::seed_from_u64(0),
        )
    }

    fn leaf(label: &str) -> NodeSpec {
        Trial::new(json!({ "label": label })).into()
    }

    fn drain(instance: &mut TimelineInstance) -> Vec<String> {
        let data = DataLog::new();
        let mut journal = EventJournal::new(false);
        let mut out = Vec::new();
        loop {
            match instance.step(&data, &mut journal).unwrap() {
                Step::Trial { trial, path } => {
                    out.push(format!("{}@{path}", trial.params["label"].as_str().unwrap()));
                }
                Step::Descend { .. } => panic!("unexpected nested timeline"),
                Step::Exhausted => return out,
            }
        }
    }

    #[test]
    fn repetitions_walk_children_in_order() {
        let mut timeline = instance(TimelineSpec::new(vec![leaf("a"), leaf("b")]).repetitions(2));
        assert_eq!(
            drain(&mut timeline),
            vec!["a@0.0.0", "b@1.0.0", "a@0.0.1", "b@1.0.1"]
        );
        assert!(timeline.is_exhausted());
    }

    #[test]
    fn conditional_false_exhausts_without_children() {
        let mut timeline =
            instance(TimelineSpec::new(vec![leaf("a")]).conditional(PredicateSpec::Never));
        assert!(drain(&mut timeline).is_empty());
        assert_eq!(timeline.cursor().state, NodeState::Exhausted);
    }

    #[test]
    fn loop_without_trials_is_an_error() {
        let mut timeline =
            instance(TimelineSpec::new(Vec::new()).loop_while(PredicateSpec::Always));
        let err = timeline
            .step(&DataLog::new(), &mut EventJournal::new(false))
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyLoop { .. }));
    }

    #[test]
    fn terminate_skips_remaining_children() {
        let mut timeline = instance(TimelineSpec::new(vec![leaf("a"), leaf("b")]).repetitions(3));
        let data = DataLog::new();
        let mut journal = EventJournal::new(true);
        assert!(matches!(
            timeline.step(&data, &mut journal).unwrap(),
            Step::Trial { .. }
        ));
        timeline.terminate();
        assert!(matches!(
            timeline.step(&data, &mut journal).unwrap(),
            Step::Exhausted
        ));
        assert!(journal
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::TimelineTerminated { .. })));
    }

    #[test]
    fn only_looping_timelines_keep_pass_records() {
        let record = TrialRecord {
            trial_index: 0,
            path: NodePath::root(),
            data: json!({}),
        };
        let mut plain = instance(TimelineSpec::new(vec![leaf("a")]));
        let mut looping =
            instance(TimelineSpec::new(vec![leaf("a")]).loop_while(PredicateSpec::Never));
        plain.record(&record);
        looping.record(&record);
        assert!(plain.iteration.is_empty());
        assert_eq!(looping.iteration.len(), 1);
    }

    #[test]
    fn append_child_extends_sequence() {
        let mut timeline = instance(TimelineSpec::new(vec![leaf("a")]));
        assert_eq!(timeline.append_child(leaf("b")), 1);
        assert_eq!(drain(&mut timeline), vec!["a@0.0.0", "b@1.0.0"]);
    }
}
