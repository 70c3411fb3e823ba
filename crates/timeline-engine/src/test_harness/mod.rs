// Test harness module
// Seeded simulation of random timeline trees

pub mod simulator;

pub use simulator::*;

/// Entry points for simulation and certification runs
pub struct TestHarness;

impl TestHarness {
    /// Run the simulator over ten seeds
    pub fn run_certification(timelines_per_seed: u64) -> CertificationReport {
        let mut all_passed = true;
        let mut total_violations = 0;
        let mut trials_executed = 0;

        for seed in 0..10 {
            let config = SimulatorConfig {
                seed,
                total_timelines: timelines_per_seed,
                stop_on_first_violation: false,
                ..Default::default()
            };

            let report = run_simulator(config);
            if !report.passed() {
                all_passed = false;
            }
            total_violations += report.violations.len();
            trials_executed += report.trials_executed;
        }

        CertificationReport {
            passed: all_passed && total_violations == 0,
            total_violations,
            trials_executed,
            seeds_tested: 10,
        }
    }
}

/// Report from certification
#[derive(Debug, Clone)]
pub struct CertificationReport {
    pub passed: bool,
    pub total_violations: usize,
    pub trials_executed: u64,
    pub seeds_tested: u64,
}
