use pretty_assertions::assert_eq;
use serde_json::json;
use timeline_engine::error::DescriptionError;
use timeline_engine::prelude::*;
use timeline_test_utils::{run_to_end, seeded_engine, stimulus};

fn run_json(text: &str) -> Vec<String> {
    let root = load_timeline(text).unwrap();
    run_to_end(&mut seeded_engine(5), root, |trial| {
        TrialCompletion::new(json!({ "seen": stimulus(trial) }))
    })
    .unwrap()
}

#[test]
fn test_loaded_timeline_expands_variables() {
    let seen = run_json(
        r#"{
            "timeline": [
                {"stimulus": {"$var": "word"}},
                {"stimulus": "mask"}
            ],
            "timeline_variables": [{"word": "a"}, {"word": "b"}],
            "repetitions": 2
        }"#,
    );
    assert_eq!(seen, vec!["a", "mask", "a", "mask", "b", "mask", "b", "mask"]);
}

#[test]
fn test_loaded_conditional_and_loop() {
    let seen = run_json(
        r#"[
            {"stimulus": "intro"},
            {
                "timeline": [{"stimulus": "skipped"}],
                "conditional": {"kind": "never"}
            },
            {
                "timeline": [{"stimulus": "practice"}],
                "loop": {"kind": "iteration_below", "count": 3}
            }
        ]"#,
    );
    assert_eq!(seen, vec!["intro", "practice", "practice", "practice"]);
}

#[test]
fn test_loaded_defaults_flow_to_trials() {
    let root = load_timeline(
        r#"{
            "type": "html-keyboard",
            "timeline": [{"stimulus": "x"}, {"stimulus": "y", "type": "audio"}]
        }"#,
    )
    .unwrap();
    let mut engine = seeded_engine(0);
    let first = engine.start(root).unwrap().unwrap();
    assert_eq!(first.param("type"), Some(&json!("html-keyboard")));
    let second = engine.complete_trial(json!({})).unwrap().unwrap();
    assert_eq!(second.param("type"), Some(&json!("audio")));
}

#[test]
fn test_sampling_without_replacement_from_json() {
    let root = load_timeline(
        r#"{
            "timeline": [{"stimulus": {"$var": "n"}}],
            "timeline_variables": [{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}],
            "sample": {"type": "without_replacement", "size": 2}
        }"#,
    )
    .unwrap();
    let seen = run_to_end(&mut seeded_engine(5), root, |_| TrialCompletion::new(json!({}))).unwrap();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1]);
}

#[test]
fn test_oversized_sample_rejected_at_start() {
    let root = load_timeline(
        r#"{
            "timeline": [{"stimulus": "x"}],
            "timeline_variables": [{"n": 1}],
            "sample": {"type": "without_replacement", "size": 2}
        }"#,
    )
    .unwrap();
    let report = validate(&root, false);
    assert!(report.is_err());
    assert!(seeded_engine(0).start(root).is_err());
}

#[test]
fn test_leaf_with_controls_rejected() {
    let err = load_timeline(r#"[{"stimulus": "x", "repetitions": 2}]"#).unwrap_err();
    match err {
        DescriptionError::Engine(EngineError::InvalidNodeSpec { path, reason }) => {
            assert_eq!(path, "root.timeline[0]");
            assert!(reason.contains("repetitions"));
        }
        other => panic!("expected InvalidNodeSpec, got {other:?}"),
    }
}

#[test]
fn test_randomize_order_with_sample_rejected() {
    let err = load_timeline(
        r#"{
            "timeline": [{}],
            "timeline_variables": [{"n": 1}],
            "randomize_order": true,
            "sample": {"type": "shuffle"}
        }"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DescriptionError::Engine(EngineError::InvalidNodeSpec { .. })
    ));
}

#[test]
fn test_unknown_predicate_kind_is_json_error() {
    let err = load_timeline(r#"{"timeline": [{}], "loop": {"kind": "sometimes"}}"#).unwrap_err();
    assert!(matches!(err, DescriptionError::Json(_)));
}

#[test]
fn test_validate_reports_shape_and_warnings() {
    let root = load_timeline(
        r#"{
            "timeline": [
                {"stimulus": "a"},
                {"timeline": [{"stimulus": "b"}], "repetitions": 3, "loop": {"kind": "never"}}
            ]
        }"#,
    )
    .unwrap();
    let report = validate(&root, false).unwrap();
    assert_eq!(report.trial_count, 2);
    assert_eq!(report.timeline_count, 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(validate(&root, true).is_err());
}
