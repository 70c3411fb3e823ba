//! Timeline node definitions
//!
//! A node is either a leaf [`Trial`] or an interior [`TimelineSpec`] holding an
//! ordered sequence of child nodes plus the controls that decide how often,
//! and whether, those children run.

use crate::engine::EngineControl;
use crate::expansion::Sampling;
use crate::predicate::Predicate;
use crate::scope::VariableScope;
use crate::types::{TrialData, VariableRecord};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Runs when a trial becomes active
pub type TrialHook = Arc<dyn Fn(&mut EngineControl<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Runs after a trial's data has been recorded
pub type FinishHook =
    Arc<dyn Fn(&mut EngineControl<'_>, &TrialData) -> anyhow::Result<()> + Send + Sync>;

/// Runs when an expansion copy of a timeline starts or finishes
pub type TimelineHook = Arc<dyn Fn(&VariableScope) + Send + Sync>;

/// Leaf node: one unit of presentation
///
/// `params` are opaque to the engine apart from `{"$var": name}`
/// placeholders, which are resolved against the active scope when the trial
/// is issued.
#[derive(Clone, Default)]
pub struct Trial {
    pub params: Value,
    pub on_start: Option<TrialHook>,
    pub on_finish: Option<FinishHook>,
}

impl Trial {
    pub fn new(params: Value) -> Self {
        Self {
            params,
            on_start: None,
            on_finish: None,
        }
    }

    #[must_use]
    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EngineControl<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_finish<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EngineControl<'_>, &TrialData) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trial")
            .field("params", &self.params)
            .field("on_start", &self.on_start.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Interior node
#[derive(Clone)]
pub struct TimelineSpec {
    pub children: Vec<NodeSpec>,
    /// Passes per expansion copy; ignored when `loop_predicate` is set
    pub repetitions: u32,
    /// Asked after every pass; `true` runs another
    pub loop_predicate: Option<Predicate>,
    /// Asked once per copy before it starts; `false` skips the copy
    pub conditional: Option<Predicate>,
    /// One expansion copy per record; `None` means a single copy
    pub variables: Option<Vec<VariableRecord>>,
    pub sampling: Option<Sampling>,
    /// Parameters inherited by every trial below unless the trial sets them
    ///
    /// Merged only into object (or null) trial params. A trial whose params
    /// are a bare scalar or array keeps them as authored, without defaults.
    pub defaults: Map<String, Value>,
    pub on_timeline_start: Option<TimelineHook>,
    pub on_timeline_finish: Option<TimelineHook>,
}

impl Default for TimelineSpec {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            repetitions: 1,
            loop_predicate: None,
            conditional: None,
            variables: None,
            sampling: None,
            defaults: Map::new(),
            on_timeline_start: None,
            on_timeline_finish: None,
        }
    }
}

impl TimelineSpec {
    pub fn new(children: Vec<NodeSpec>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    #[must_use]
    pub fn loop_while(mut self, predicate: impl Into<Predicate>) -> Self {
        self.loop_predicate = Some(predicate.into());
        self
    }

    #[must_use]
    pub fn conditional(mut self, predicate: impl Into<Predicate>) -> Self {
        self.conditional = Some(predicate.into());
        self
    }

    #[must_use]
    pub fn variables(mut self, records: Vec<VariableRecord>) -> Self {
        self.variables = Some(records);
        self
    }

    #[must_use]
    pub fn sample(mut self, sampling: Sampling) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Shorthand for [`Sampling::Shuffle`]
    #[must_use]
    pub fn randomize_order(self) -> Self {
        self.sample(Sampling::Shuffle)
    }

    #[must_use]
    pub fn default_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn on_timeline_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VariableScope) + Send + Sync + 'static,
    {
        self.on_timeline_start = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_timeline_finish<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VariableScope) + Send + Sync + 'static,
    {
        self.on_timeline_finish = Some(Arc::new(hook));
        self
    }

    /// Number of expansion copies before sampling
    pub fn record_count(&self) -> Option<usize> {
        self.variables.as_ref().map(Vec::len)
    }
}

impl fmt::Debug for TimelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineSpec")
            .field("children", &self.children)
            .field("repetitions", &self.repetitions)
            .field("loop_predicate", &self.loop_predicate)
            .field("conditional", &self.conditional)
            .field("variables", &self.variables)
            .field("sampling", &self.sampling)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// A node of the timeline tree
#[derive(Debug, Clone)]
pub enum NodeSpec {
    Trial(Arc<Trial>),
    Timeline(Arc<TimelineSpec>),
}

impl NodeSpec {
    pub fn is_trial(&self) -> bool {
        matches!(self, Self::Trial(_))
    }

    /// Trials reachable below this node, counted once each
    pub fn trial_count(&self) -> usize {
        match self {
            Self::Trial(_) => 1,
            Self::Timeline(spec) => spec.children.iter().map(NodeSpec::trial_count).sum(),
        }
    }
}

impl From<Trial> for NodeSpec {
    fn from(trial: Trial) -> Self {
        Self::Trial(Arc::new(trial))
    }
}

impl From<TimelineSpec> for NodeSpec {
    fn from(spec: TimelineSpec) -> Self {
        Self::Timeline(Arc::new(spec))
    }
}
