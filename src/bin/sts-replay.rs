//! CLI entry point, spec §A.4: `sts-replay simulate --config <path>`.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use log::error;

use sts_replay::{
    config::Config,
    dag::EventDag,
    error::EngineError,
    mcs::{MCSFinder, MCSFinderOptions},
    replay::Replayer,
    sim::MockSimulation,
    stats::RuntimeStats,
    trace,
};

#[derive(Parser)]
#[command(name = "sts-replay", about = "Deterministic replay and causal-minimization engine for SDN control traces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a trace and, if the configured invariant is violated, search
    /// for its minimal causal subset.
    Simulate {
        #[arg(long)]
        config: PathBuf,
    },
}

fn run(config_path: &Path) -> Result<(), EngineError> {
    let config = Config::load(config_path)?;
    let events = trace::read_superlog(&config.trace_path)?;
    let dag = EventDag::new(events);
    let stats = RuntimeStats::new(config.clone(), dag.len(), dag.input_events().len());

    let replayer = Replayer::new(config.scheduler_config()).with_unacked_baseline(&config.trace_path)?;

    let mut finder = MCSFinder::new(
        config.invariant_check(),
        replayer,
        MCSFinderOptions {
            verify_replays: config.verify_replays,
            max_iterations: config.max_iterations,
            use_efficient: config.use_efficient,
            dump_dir: Some(config.output_dir.clone()),
            optimized_filtering: config.optimized_filtering,
        },
        stats,
        || Box::new(MockSimulation::new()),
    );

    let mcs = finder.run(dag)?;

    std::fs::create_dir_all(&config.output_dir).map_err(|e| EngineError::io(&config.output_dir, e))?;
    trace::write_superlog(&config.output_dir.join("mcs.trace"), mcs.events())?;
    std::fs::write(config.output_dir.join("runtime_stats.json"), finder.stats.to_json()?)
        .map_err(|e| EngineError::io(&config.output_dir, e))?;

    println!("final MCS ({} input events):", mcs.input_events().len());
    for input in mcs.input_events() {
        println!("  - {}", input.label);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let Command::Simulate { config } = cli.command;

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
