//! Error types for the timeline engine
//!
//! Provides the engine's error taxonomy:
//! - Malformed timeline descriptions (rejected before anything runs)
//! - Variable lookups that walk off the top of the scope chain
//! - Predicate and hook failures, propagated with the node they came from
//! - Misuse of the control surface (start twice, complete with nothing active)

use crate::state_machine::IllegalTransition;
use crate::types::NodePath;

/// Scope resolution failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// No scope in the chain binds the name
    #[error("undefined variable: {name}")]
    UndefinedVariable {
        /// Name that failed to resolve
        name: String,
    },
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The timeline description is malformed
    #[error("invalid node spec at {path}: {reason}")]
    InvalidNodeSpec {
        /// Description path, e.g. `root.timeline[2]`
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// A predicate or trial referenced a variable no ancestor scope binds
    #[error("undefined variable '{name}' referenced at {path}")]
    UndefinedVariable {
        /// Name that failed to resolve
        name: String,
        /// Node whose predicate or trial referenced it
        path: NodePath,
    },

    /// A loop or conditional predicate returned an error
    #[error("predicate failed at {path}: {source}")]
    Predicate {
        /// Timeline whose predicate failed
        path: NodePath,
        /// The predicate's own error, unchanged
        #[source]
        source: anyhow::Error,
    },

    /// A trial or timeline hook returned an error
    #[error("hook failed at {path}: {source}")]
    Hook {
        /// Node whose hook failed
        path: NodePath,
        /// The hook's own error, unchanged
        #[source]
        source: anyhow::Error,
    },

    /// A loop predicate asked to repeat a pass that ran no trials
    #[error("loop at {path} asked to repeat a repetition that executed no trials")]
    EmptyLoop {
        /// Timeline that would spin
        path: NodePath,
    },

    /// `start` was called on an engine that already started
    #[error("engine already started")]
    AlreadyStarted,

    /// A control operation needs a started engine
    #[error("engine not started")]
    NotStarted,

    /// Completion reported while no trial is active
    #[error("no active trial to complete")]
    NoActiveTrial,

    /// Cursor state machine violated (engine bug)
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl EngineError {
    /// Shorthand for an [`EngineError::InvalidNodeSpec`]
    pub fn invalid_spec(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeSpec {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the experiment author rather than the runtime
    #[must_use]
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidNodeSpec { .. } | Self::UndefinedVariable { .. } | Self::EmptyLoop { .. }
        )
    }

    /// Errors after which the same engine can still be used
    ///
    /// Only control-surface misuse leaves the engine untouched; everything
    /// else happens mid-advance and halts the experiment.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted | Self::NotStarted | Self::NoActiveTrial
        )
    }

    /// Map an error raised inside a predicate or hook to the engine taxonomy
    ///
    /// An [`ScopeError::UndefinedVariable`] surfaces as
    /// [`EngineError::UndefinedVariable`]; anything else is kept as the source.
    pub(crate) fn from_callback(
        path: &NodePath,
        err: anyhow::Error,
        wrap: fn(NodePath, anyhow::Error) -> Self,
    ) -> Self {
        match err.downcast::<ScopeError>() {
            Ok(ScopeError::UndefinedVariable { name }) => Self::UndefinedVariable {
                name,
                path: path.clone(),
            },
            Err(source) => wrap(path.clone(), source),
        }
    }

    pub(crate) fn predicate(path: NodePath, source: anyhow::Error) -> Self {
        Self::Predicate { path, source }
    }

    pub(crate) fn hook(path: NodePath, source: anyhow::Error) -> Self {
        Self::Hook { path, source }
    }
}

/// Failure to load a timeline description from JSON
#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    /// Not valid JSON, or JSON of the wrong shape
    #[error("malformed timeline description: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed JSON describing an invalid timeline
    #[error(transparent)]
    Engine(#[from] EngineError),
}
