use proptest::prelude::*;
use serde_json::json;
use timeline_engine::prelude::*;
use timeline_engine::test_harness::{run_simulator, SimulatorConfig};
use timeline_test_utils::{leaf, stimuli};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_leaf_count_is_repetitions_times_children(
        repetitions in 1u32..5,
        children in 0usize..5,
    ) {
        let labels: Vec<String> = (0..children).map(|i| format!("t{i}")).collect();
        let nodes = labels.iter().map(|l| leaf(l)).collect();
        let root = TimelineSpec::new(nodes).repetitions(repetitions);

        let seen = stimuli(root).unwrap();

        prop_assert_eq!(seen.len(), repetitions as usize * children);
        for (i, label) in seen.iter().enumerate() {
            prop_assert_eq!(label, &labels[i % children]);
        }
    }

    #[test]
    fn prop_gated_out_subtree_yields_nothing(
        repetitions in 1u32..4,
        records in 0usize..4,
    ) {
        let vars = (0..records).map(|n| {
            let mut record = VariableRecord::new();
            record.insert("n".to_string(), json!(n));
            record
        }).collect();
        let gated = TimelineSpec::new(vec![leaf("hidden")])
            .repetitions(repetitions)
            .variables(vars)
            .conditional(PredicateSpec::Never);
        let root = TimelineSpec::new(vec![gated.into(), leaf("shown")]);

        prop_assert_eq!(stimuli(root).unwrap(), vec!["shown".to_string()]);
    }

    #[test]
    fn prop_loop_runs_count_passes(count in 1u32..6) {
        let root = TimelineSpec::new(vec![leaf("a"), leaf("b")])
            .loop_while(PredicateSpec::IterationBelow { count });
        prop_assert_eq!(stimuli(root).unwrap().len(), 2 * count as usize);
    }
}

#[test]
fn test_simulator_passes_across_seeds() {
    for seed in 0..5 {
        let report = run_simulator(SimulatorConfig {
            seed,
            total_timelines: 50,
            stop_on_first_violation: false,
            ..Default::default()
        });
        assert!(report.passed(), "{}", report.generate_text());
    }
}
