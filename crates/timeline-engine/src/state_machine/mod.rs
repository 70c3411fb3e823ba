//! Traversal cursor state machine
//!
//! A timeline's cursor moves Gating -> Active -> Exhausted. Gating may also
//! go straight to Exhausted when the conditional skips the last copy. Moving
//! on to the next expansion copy resets the cursor to Gating; that is a reset
//! of the cursor, not a transition, and does not go through this table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a timeline's cursor stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// The conditional for the current copy has not been asked yet
    Gating,
    /// Handing out children of the current copy
    Active,
    /// Nothing left to hand out
    Exhausted,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gating => "gating",
            Self::Active => "active",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Attempted a move the table forbids
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal cursor transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: NodeState,
    pub to: NodeState,
}

/// Check a cursor transition.
///
/// Returns an error for forbidden moves. With the `strict-debug` feature the
/// forbidden move panics instead, so engine bugs surface at the call site.
pub fn validate_transition(from: NodeState, to: NodeState) -> Result<(), IllegalTransition> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal cursor transition attempted: {from:?} -> {to:?}");

        Err(IllegalTransition { from, to })
    }
}

pub fn allowed_transitions(from: NodeState) -> Vec<NodeState> {
    use NodeState::*;
    match from {
        Gating => vec![Active, Exhausted],
        Active => vec![Exhausted],
        Exhausted => vec![],
    }
}

fn allowed(from: NodeState, to: NodeState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gating_can_activate_or_exhaust() {
        assert!(validate_transition(NodeState::Gating, NodeState::Active).is_ok());
        assert!(validate_transition(NodeState::Gating, NodeState::Exhausted).is_ok());
    }

    #[test]
    #[cfg(not(feature = "strict-debug"))]
    fn exhausted_is_terminal() {
        assert!(allowed_transitions(NodeState::Exhausted).is_empty());
        let err = validate_transition(NodeState::Exhausted, NodeState::Active).unwrap_err();
        assert_eq!(err.to_string(), "illegal cursor transition: exhausted -> active");
    }

    #[test]
    #[cfg(not(feature = "strict-debug"))]
    fn active_cannot_go_back_to_gating() {
        assert!(validate_transition(NodeState::Active, NodeState::Gating).is_err());
    }
}
