//! Fixpoint Run - executes a built-in demonstration network
//!
//! Networks are assembled in code. Each instant's boundary outputs are
//! printed to stdout, or the whole run report as JSON with `--json`.
//! Logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use fixpoint_runtime::actors::{Const, Map, Pre, Seed, Zip2};
use fixpoint_runtime::{
    Director, DirectorConfig, InstantReport, Network, Result, RunReport, StopReason, Value,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Instants run when neither the command line nor the config says otherwise.
const DEFAULT_INSTANTS: u64 = 5;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Demo {
    /// Source -> +1 -> *2
    Chain,
    /// Register feeding an incrementer: counts instants
    Counter,
    /// Non-strict seed closing a loop with a multiplier
    Feedback,
    /// Two strict actors in a loop; never resolves
    Cycle,
    /// Adds two boundary inputs, one of which is absent every other instant
    Adder,
    /// Source that excludes itself after three instants
    Burst,
}

impl Demo {
    fn build(self) -> Result<Network> {
        let mut net = Network::new();
        match self {
            Demo::Chain => {
                net.add_actor("source", Const::new(1i64))?;
                net.add_actor("inc", Map::add(1))?;
                net.add_actor("double", Map::scale(2))?;
                net.connect("source.out", "inc.in")?;
                net.connect("inc.out", "double.in")?;
                net.expose_output("double.out", "out")?;
            }
            Demo::Counter => {
                net.add_actor("state", Pre::with_initial(0i64))?;
                net.add_actor("inc", Map::add(1))?;
                net.connect("state.out", "inc.in")?;
                net.connect("inc.out", "state.in")?;
                net.expose_output("inc.out", "count")?;
            }
            Demo::Feedback => {
                net.add_actor("seed", Seed::new(1i64))?;
                net.add_actor("triple", Map::scale(3))?;
                net.connect("seed.out", "triple.in")?;
                net.connect("triple.out", "seed.in")?;
                net.expose_output("triple.out", "out")?;
            }
            Demo::Cycle => {
                net.add_actor("x", Map::add(1))?;
                net.add_actor("y", Map::add(1))?;
                net.connect("x.out", "y.in")?;
                net.connect("y.out", "x.in")?;
                net.expose_output("x.out", "stuck")?;
            }
            Demo::Adder => {
                let add = Zip2::new(|a, b| {
                    match (a.and_then(Value::as_integer), b.and_then(Value::as_integer)) {
                        (None, None) => None,
                        (x, y) => x.unwrap_or(0).checked_add(y.unwrap_or(0)).map(Value::Integer),
                    }
                });
                net.add_actor("add", add)?;
                net.expose_input("x", "add.a")?;
                net.expose_input("y", "add.b")?;
                net.expose_output("add.out", "sum")?;
            }
            Demo::Burst => {
                net.add_actor("burst", Const::new(7i64).with_firing_limit(3))?;
                let square = Map::new(|v| {
                    let x = v.as_integer()?;
                    x.checked_mul(x).map(Value::Integer)
                });
                net.add_actor("square", square)?;
                net.connect("burst.out", "square.in")?;
                net.expose_output("square.out", "out")?;
            }
        }
        Ok(net)
    }

    /// Boundary inputs staged before `instant`
    fn stimulus(self, instant: u64) -> Vec<(&'static str, Option<Value>)> {
        match self {
            Demo::Adder => vec![
                ("x", Some(Value::Integer(instant as i64))),
                ("y", (instant % 2 == 0).then_some(Value::Integer(100))),
            ],
            _ => Vec::new(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fixpoint-run")]
#[command(about = "Run a built-in network under fixed-point semantics")]
struct Cli {
    /// Network to run
    #[arg(value_enum)]
    demo: Demo,

    /// Number of instants (defaults to the config's `iterations`, then 5)
    #[arg(long)]
    instants: Option<u64>,

    /// Director configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fixpoint_run=info,fixpoint_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match DirectorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => DirectorConfig::default(),
    };

    let instants = cli.instants.unwrap_or(if config.iterations > 0 {
        config.iterations
    } else {
        DEFAULT_INSTANTS
    });

    info!(demo = ?cli.demo, instants, "running demo network");

    let report = match run(cli.demo, config, instants) {
        Ok(report) => report,
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }
}

fn run(demo: Demo, config: DirectorConfig, instants: u64) -> Result<RunReport> {
    let mut director = Director::with_config(demo.build()?, config);
    director.initialize()?;

    let mut reports = Vec::new();
    let stopped_reason = loop {
        if reports.len() as u64 >= instants {
            break StopReason::IterationsReached;
        }
        if director.network().actor_ids().all(|a| director.is_excluded(a)) {
            break StopReason::AllExcluded;
        }
        for (label, value) in demo.stimulus(director.instant()) {
            director.stage_input(label, value)?;
        }
        reports.push(director.run_instant()?);
    };

    director.wrapup()?;
    Ok(RunReport {
        instants: reports,
        total_firings: director.total_firings(),
        stopped_reason,
        schedule_warnings: director.schedule().warnings().to_vec(),
    })
}

fn print_report(report: &RunReport) {
    for warning in &report.schedule_warnings {
        println!("warning: {warning}");
    }
    for instant in &report.instants {
        print_instant(instant);
    }
    println!(
        "stopped after {} instant(s), {} firing(s): {}",
        report.instants.len(),
        report.total_firings,
        report.stopped_reason
    );
}

fn print_instant(report: &InstantReport) {
    println!(
        "instant {}: {} round(s), {} firing(s), {}/{} cells known",
        report.instant, report.rounds, report.firings, report.known_cells, report.total_cells
    );
    for (label, value) in &report.outputs {
        match value {
            Some(v) => println!("  {label} = {v}"),
            None => println!("  {label} = absent"),
        }
    }
    if !report.unresolved.is_empty() {
        println!("  unknown: {}", report.unresolved.join(", "));
    }
    for actor in &report.newly_excluded {
        println!("  excluded: {actor}");
    }
}
