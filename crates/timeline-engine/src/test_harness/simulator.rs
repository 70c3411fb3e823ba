//! Timeline simulator
//!
//! Generates random timeline trees from a seed, runs each one to the end with
//! a responder that answers every trial immediately, and compares the number
//! of trials executed against the count the tree's controls imply.

use crate::engine::{EngineConfig, TimelineEngine};
use crate::expansion::Sampling;
use crate::node::{NodeSpec, TimelineSpec, Trial};
use crate::predicate::PredicateSpec;
use crate::types::{NodePath, VariableRecord};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of random trees to run
    pub total_timelines: u64,
    pub max_depth: usize,
    pub max_children: usize,
    /// Trees expected to run more trials than this are skipped
    pub max_trials_per_timeline: u64,
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            total_timelines: 200,
            max_depth: 3,
            max_children: 3,
            max_trials_per_timeline: 5_000,
            stop_on_first_violation: true,
        }
    }
}

/// A violation detected during simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Executed trial count differs from what the controls imply
    CountMismatch {
        timeline_index: u64,
        expected: u64,
        actual: u64,
    },
    /// The engine returned an error on a valid tree
    EngineFailed { timeline_index: u64, error: String },
    /// Two runs with the same seed visited different paths
    NotIdempotent { timeline_index: u64 },
}

/// Final report from the simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub timelines_run: u64,
    pub timelines_skipped: u64,
    pub trials_executed: u64,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate a text report
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Timeline Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Timelines Run: {}\n", self.timelines_run));
        report.push_str(&format!("Timelines Skipped: {}\n", self.timelines_skipped));
        report.push_str(&format!("Trials Executed: {}\n", self.trials_executed));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// A generated tree and the number of trials it must produce
#[derive(Debug, Clone)]
pub struct GeneratedTimeline {
    pub root: NodeSpec,
    pub expected_trials: u64,
}

/// Run the simulator
pub fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut violations = Vec::new();
    let mut timelines_run = 0;
    let mut timelines_skipped = 0;
    let mut trials_executed = 0;

    for timeline_index in 0..config.total_timelines {
        let generated = generate_timeline(&mut rng, &config);
        if generated.expected_trials > config.max_trials_per_timeline {
            timelines_skipped += 1;
            continue;
        }
        timelines_run += 1;

        let engine_seed = config.seed.wrapping_add(timeline_index);
        let limit = generated.expected_trials + 1;
        let first = run_once(&generated.root, engine_seed, limit);
        let violation = match first {
            Err(error) => Some(Violation::EngineFailed {
                timeline_index,
                error,
            }),
            Ok(paths) => {
                let actual = paths.len() as u64;
                trials_executed += actual;
                if actual != generated.expected_trials {
                    Some(Violation::CountMismatch {
                        timeline_index,
                        expected: generated.expected_trials,
                        actual,
                    })
                } else if run_once(&generated.root, engine_seed, limit).ok() != Some(paths) {
                    Some(Violation::NotIdempotent { timeline_index })
                } else {
                    None
                }
            }
        };

        if let Some(violation) = violation {
            violations.push(violation);
            if config.stop_on_first_violation {
                break;
            }
        }
    }

    SimulatorReport {
        config,
        timelines_run,
        timelines_skipped,
        trials_executed,
        violations,
    }
}

/// Run `root` to the end, answering every trial at once; stops after `limit`
fn run_once(root: &NodeSpec, seed: u64, limit: u64) -> Result<Vec<NodePath>, String> {
    let mut engine = TimelineEngine::new(EngineConfig::default().with_seed(seed).with_journal(false));
    let mut paths = Vec::new();
    let mut next = engine.start(root.clone()).map_err(|e| e.to_string())?;
    while let Some(trial) = next {
        paths.push(trial.path.clone());
        if paths.len() as u64 >= limit {
            break;
        }
        next = engine
            .complete_trial(json!({ "trial": trial.trial_index }))
            .map_err(|e| e.to_string())?;
    }
    Ok(paths)
}

/// Generate a random root timeline with its expected trial count
pub fn generate_timeline(rng: &mut StdRng, config: &SimulatorConfig) -> GeneratedTimeline {
    let (spec, expected_trials) = generate_node(rng, config, 0);
    GeneratedTimeline {
        root: spec.into(),
        expected_trials,
    }
}

fn generate_node(rng: &mut StdRng, config: &SimulatorConfig, depth: usize) -> (TimelineSpec, u64) {
    let child_count = rng.gen_range(0..=config.max_children);
    let mut children = Vec::with_capacity(child_count);
    let mut per_pass = 0u64;
    for i in 0..child_count {
        if depth < config.max_depth && rng.gen_bool(0.35) {
            let (child, count) = generate_node(rng, config, depth + 1);
            children.push(child.into());
            per_pass += count;
        } else {
            children.push(Trial::new(json!({ "depth": depth, "child": i })).into());
            per_pass += 1;
        }
    }

    let mut spec = TimelineSpec::new(children);

    let mut copies = 1u64;
    if rng.gen_bool(0.4) {
        let record_count = rng.gen_range(0..=3usize);
        let records: Vec<VariableRecord> = (0..record_count)
            .map(|n| {
                let mut record = VariableRecord::new();
                record.insert(format!("v{depth}"), json!(n));
                record
            })
            .collect();
        copies = record_count as u64;
        spec = spec.variables(records);
        match rng.gen_range(0..4) {
            0 => spec = spec.randomize_order(),
            1 => {
                spec = spec.sample(Sampling::FixedRepetitions { size: 2 });
                copies *= 2;
            }
            2 if record_count > 0 => {
                let size = rng.gen_range(0..=record_count);
                spec = spec.sample(Sampling::WithoutReplacement { size });
                copies = size as u64;
            }
            _ => {}
        }
    }

    let passes = if per_pass > 0 && rng.gen_bool(0.25) {
        let count = rng.gen_range(1..=3u32);
        spec = spec.loop_while(PredicateSpec::IterationBelow { count });
        u64::from(count)
    } else {
        let repetitions = rng.gen_range(1..=2u32);
        spec = spec.repetitions(repetitions);
        u64::from(repetitions)
    };

    let admitted = match rng.gen_range(0..5) {
        0 => {
            spec = spec.conditional(PredicateSpec::Never);
            false
        }
        1 => {
            spec = spec.conditional(PredicateSpec::Always);
            true
        }
        _ => true,
    };

    let expected = if admitted { copies * passes * per_pass } else { 0 };
    (spec, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_run_passes() {
        let report = run_simulator(SimulatorConfig {
            seed: 7,
            total_timelines: 25,
            ..Default::default()
        });
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.timelines_run + report.timelines_skipped, 25);
    }

    #[test]
    fn generation_is_seeded() {
        let config = SimulatorConfig::default();
        let a = generate_timeline(&mut StdRng::seed_from_u64(3), &config);
        let b = generate_timeline(&mut StdRng::seed_from_u64(3), &config);
        assert_eq!(a.expected_trials, b.expected_trials);
        assert_eq!(a.root.trial_count(), b.root.trial_count());
    }
}
