//! Timeline engine for behavioral experiments
//!
//! Sequences trials through a tree of timelines, two-phase:
//! 1. **Construction**: describe the tree (in code or JSON) and validate it
//! 2. **Traversal**: hand out one trial at a time, applying repetitions,
//!    loops, conditionals and variable expansion as the cursor moves
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use timeline_engine::prelude::*;
//! use serde_json::json;
//!
//! let root = TimelineSpec::new(vec![
//!     Trial::new(json!({"stimulus": {"$var": "word"}})).into(),
//! ])
//! .variables(records);
//!
//! let mut engine = TimelineEngine::new(EngineConfig::default().with_seed(7));
//! let mut next = engine.start(root)?;
//! while let Some(trial) = next {
//!     let data = present(&trial);
//!     next = engine.complete_trial(data)?;
//! }
//! ```

// Core modules
pub mod error;
pub mod predicate;
pub mod scope;
pub mod state_machine;
pub mod types;

// Tree and traversal
pub mod construction;
pub mod cursor;
pub mod engine;
pub mod events;
pub mod executor;
pub mod expansion;
pub mod node;

// Test harness
pub mod test_harness;

// Re-exports
pub use error::*;
pub use types::*;

/// Common imports for building and running timelines
pub mod prelude {
    pub use crate::construction::{load_timeline, validate, NodeDescription, ValidationReport};
    pub use crate::engine::{
        ActiveTrial, EngineConfig, EngineControl, TimelineEngine, TrialCompletion,
    };
    pub use crate::error::{EngineError, ScopeError};
    pub use crate::events::{EngineEvent, EventJournal};
    pub use crate::executor::{Executor, RunError, RunSummary, RunnerError, TrialRunner};
    pub use crate::expansion::Sampling;
    pub use crate::node::{NodeSpec, TimelineSpec, Trial};
    pub use crate::predicate::{Predicate, PredicateInput, PredicateSpec};
    pub use crate::scope::VariableScope;
    pub use crate::state_machine::NodeState;
    pub use crate::types::{DataLog, NodePath, Progress, TrialData, TrialRecord, VariableRecord};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
