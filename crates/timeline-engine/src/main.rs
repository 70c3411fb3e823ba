use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::json;
use timeline_engine::construction::{load_timeline, validate};
use timeline_engine::engine::{ActiveTrial, EngineConfig, TimelineEngine, TrialCompletion};
use timeline_engine::executor::{Executor, RunnerError, TrialRunner};
use timeline_engine::test_harness::{run_simulator, SimulatorConfig, TestHarness};
use tracing_subscriber::EnvFilter;

/// Prints each trial and answers from a fixed list of responses, cycling
struct EchoRunner {
    responses: Vec<String>,
}

#[async_trait::async_trait]
impl TrialRunner for EchoRunner {
    async fn execute_trial(&mut self, trial: &ActiveTrial) -> Result<TrialCompletion, RunnerError> {
        println!("[{}] {} {}", trial.trial_index, trial.path, trial.params);
        let data = if self.responses.is_empty() {
            json!({})
        } else {
            let index = usize::try_from(trial.trial_index).unwrap_or(0) % self.responses.len();
            json!({ "response": self.responses[index] })
        };
        Ok(TrialCompletion::new(data))
    }
}

fn cli() -> Command {
    Command::new("timeline-sim")
        .version(timeline_engine::VERSION)
        .about("Run, validate and simulate experiment timelines")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a timeline file, answering every trial automatically")
                .arg(Arg::new("file").required(true).help("Timeline description (JSON)"))
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Seed for record sampling"),
                )
                .arg(
                    Arg::new("response")
                        .long("response")
                        .action(ArgAction::Append)
                        .help("Response value reported for trials, cycled in order"),
                )
                .arg(
                    Arg::new("max-trials")
                        .long("max-trials")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many trials"),
                )
                .arg(
                    Arg::new("journal")
                        .long("journal")
                        .action(ArgAction::SetTrue)
                        .help("Print the engine journal after the run"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a timeline file without running it")
                .arg(Arg::new("file").required(true).help("Timeline description (JSON)"))
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .action(ArgAction::SetTrue)
                        .help("Treat loop + repetitions as an error"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the timeline simulator")
                .arg(
                    Arg::new("timelines")
                        .long("timelines")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("Number of random timelines to run"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                ),
        )
        .subcommand(
            Command::new("certify")
                .about("Run the simulator over a fixed set of seeds")
                .arg(
                    Arg::new("timelines")
                        .long("timelines")
                        .default_value("100")
                        .value_parser(value_parser!(u64))
                        .help("Timelines per seed"),
                ),
        )
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_timeline(args: &ArgMatches) -> anyhow::Result<timeline_engine::node::NodeSpec> {
    let path = args
        .get_one::<String>("file")
        .context("missing timeline file")?;
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    load_timeline(&text).with_context(|| format!("loading {path}"))
}

async fn run(args: &ArgMatches) -> anyhow::Result<i32> {
    let root = read_timeline(args)?;
    let mut config = EngineConfig::default();
    if let Some(seed) = args.get_one::<u64>("seed") {
        config = config.with_seed(*seed);
    }
    let responses = args
        .get_many::<String>("response")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let mut engine = TimelineEngine::new(config);
    let mut executor = Executor::new(EchoRunner { responses });
    if let Some(max) = args.get_one::<u64>("max-trials") {
        executor = executor.with_max_trials(*max);
    }

    let outcome = executor.run(&mut engine, root).await;
    if args.get_flag("journal") {
        println!("{}", engine.journal().to_json()?);
    }
    let summary = outcome?;
    println!();
    println!("Run {}", summary.run_id);
    println!("  Trials: {}", summary.trials_executed);
    println!("  Finished: {}", summary.finished);
    println!("  Elapsed: {} ms", summary.elapsed_ms);
    Ok(0)
}

fn validate_file(args: &ArgMatches) -> anyhow::Result<i32> {
    let root = read_timeline(args)?;
    match validate(&root, args.get_flag("strict")) {
        Ok(report) => {
            println!("Timeline is valid");
            println!("  Trials: {}", report.trial_count);
            println!("  Timelines: {}", report.timeline_count);
            println!("  Depth: {}", report.max_depth);
            for warning in &report.warnings {
                println!("  Warning: {warning}");
            }
            Ok(0)
        }
        Err(e) => {
            println!("Timeline is invalid: {e}");
            Ok(1)
        }
    }
}

fn simulate(args: &ArgMatches) -> i32 {
    let config = SimulatorConfig {
        seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
        total_timelines: args.get_one::<u64>("timelines").copied().unwrap_or(200),
        stop_on_first_violation: args.get_flag("stop-on-violation"),
        ..Default::default()
    };

    println!("Running timeline simulator...");
    println!("Timelines: {}", config.total_timelines);
    println!("Seed: {}", config.seed);
    println!();

    let report = run_simulator(config);
    println!("{}", report.generate_text());
    i32::from(!report.passed())
}

fn certify(args: &ArgMatches) -> i32 {
    let timelines = args.get_one::<u64>("timelines").copied().unwrap_or(100);
    println!("Running certification simulation...");
    let report = TestHarness::run_certification(timelines);
    println!("Certification Report:");
    println!("  Seeds: {}", report.seeds_tested);
    println!("  Trials: {}", report.trials_executed);
    println!("  Violations: {}", report.total_violations);
    println!("  Passed: {}", report.passed);
    i32::from(!report.passed)
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let code = match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("validate", args)) => validate_file(args),
        Some(("simulate", args)) => Ok(simulate(args)),
        Some(("certify", args)) => Ok(certify(args)),
        _ => {
            let _ = cli().print_help();
            Ok(0)
        }
    };

    match code {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
