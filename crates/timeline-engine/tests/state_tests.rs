#![cfg(not(feature = "strict-debug"))]

use proptest::prelude::*;
use timeline_engine::state_machine::{allowed_transitions, validate_transition, NodeState};

#[test]
fn test_gating_transitions() {
    assert!(validate_transition(NodeState::Gating, NodeState::Active).is_ok());
    assert!(validate_transition(NodeState::Gating, NodeState::Exhausted).is_ok());

    // Invalid
    assert!(validate_transition(NodeState::Gating, NodeState::Gating).is_err());
}

#[test]
fn test_exhausted_is_terminal() {
    // Moving on to the next copy is a cursor reset, never a transition
    assert!(validate_transition(NodeState::Exhausted, NodeState::Gating).is_err());
    assert!(validate_transition(NodeState::Exhausted, NodeState::Active).is_err());
}

fn any_state() -> impl Strategy<Value = NodeState> {
    prop_oneof![
        Just(NodeState::Gating),
        Just(NodeState::Active),
        Just(NodeState::Exhausted),
    ]
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_state(), to in any_state()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_no_transition_returns_to_gating(from in any_state()) {
        prop_assert!(!allowed_transitions(from).contains(&NodeState::Gating));
    }
}
