//! Loop and conditional predicates
//!
//! A predicate is either a closure or a declarative [`PredicateSpec`] that can
//! be loaded from a timeline description. Both see the same input: the scope
//! of the expansion copy being evaluated, a slice of trial records, and the
//! number of repetitions the copy has completed.
//!
//! For loop predicates the records are those of the most recent repetition
//! only. For conditional predicates they are everything recorded so far in
//! the run.

use crate::error::ScopeError;
use crate::scope::VariableScope;
use crate::types::TrialRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a predicate gets to look at
#[derive(Debug, Clone, Copy)]
pub struct PredicateInput<'a> {
    pub scope: &'a VariableScope,
    pub data: &'a [TrialRecord],
    /// Completed repetitions of the copy (0 when gating)
    pub iteration: u32,
}

/// Signature of a closure predicate
pub type PredicateFn = dyn Fn(&PredicateInput<'_>) -> anyhow::Result<bool> + Send + Sync;

/// Loop or conditional predicate attached to a timeline
#[derive(Clone)]
pub enum Predicate {
    Spec(PredicateSpec),
    Custom(Arc<PredicateFn>),
}

impl Predicate {
    /// Wrap a closure
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&PredicateInput<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn evaluate(&self, input: &PredicateInput<'_>) -> anyhow::Result<bool> {
        match self {
            Self::Spec(spec) => Ok(spec.evaluate(input)?),
            Self::Custom(f) => f(input),
        }
    }
}

impl From<PredicateSpec> for Predicate {
    fn from(spec: PredicateSpec) -> Self {
        Self::Spec(spec)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Declarative predicate, loadable from JSON
///
/// ```json
/// {"kind": "data_equals", "field": "response", "value": "again"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateSpec {
    Always,
    Never,
    /// A scope variable equals `value`; fails if the variable is unbound
    VariableEquals { variable: String, value: Value },
    /// The last record's `field` equals `value`
    DataEquals { field: String, value: Value },
    /// Some record's `field` equals `value`
    AnyDataEquals { field: String, value: Value },
    /// Fewer than `count` repetitions have completed
    IterationBelow { count: u32 },
    Not { predicate: Box<PredicateSpec> },
    All { predicates: Vec<PredicateSpec> },
    Any { predicates: Vec<PredicateSpec> },
}

impl PredicateSpec {
    pub fn evaluate(&self, input: &PredicateInput<'_>) -> Result<bool, ScopeError> {
        match self {
            Self::Always => Ok(true),
            Self::Never => Ok(false),
            Self::VariableEquals { variable, value } => {
                Ok(input.scope.resolve(variable)? == value)
            }
            Self::DataEquals { field, value } => Ok(input
                .data
                .last()
                .and_then(|record| record.field(field))
                .is_some_and(|found| found == value)),
            Self::AnyDataEquals { field, value } => Ok(input
                .data
                .iter()
                .filter_map(|record| record.field(field))
                .any(|found| found == value)),
            Self::IterationBelow { count } => Ok(input.iteration < *count),
            Self::Not { predicate } => Ok(!predicate.evaluate(input)?),
            Self::All { predicates } => {
                for predicate in predicates {
                    if !predicate.evaluate(input)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any { predicates } => {
                for predicate in predicates {
                    if predicate.evaluate(input)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}
