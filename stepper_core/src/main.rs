//! # Stepper Simulation Binary
//!
//! Runs a motion program on the simulated board and prints a summary.
//!
//! # Usage
//!
//! ```bash
//! # Built-in demo square on the default 3-axis machine
//! stepper_sim
//!
//! # Own machine and program, JSON summary
//! stepper_sim --config config/machine.toml --program config/square.toml --json
//!
//! # Verbose logging
//! stepper_sim -c config/machine.toml -v
//! ```

use clap::Parser;
use std::path::PathBuf;
use stepper_common::config::{LogLevel, SharedConfig};
use stepper_common::machine::config::MachineConfig;
use stepper_core::config::{LoadedConfig, load_config};
use stepper_core::program::{Program, RunSummary, run_program};
use stepper_core::{MotionControl, SimBoard, Stepper};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Side length of the built-in demo square [mm1000].
const DEMO_SIZE: i32 = 20_000;

/// Distance of the simulated switches outside the travel [mm1000].
const SWITCH_MARGIN: i32 = 1_000;

/// Stepper Sim - run motion programs on a simulated stepper board
#[derive(Parser, Debug)]
#[command(name = "stepper_sim")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Run motion programs on a simulated stepper board")]
#[command(long_about = None)]
struct Args {
    /// Machine configuration file with [shared] and [machine] tables.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Program file; the built-in demo square runs if omitted.
    #[arg(short, long, value_name = "FILE")]
    program: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs and the summary in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Simulation failed: {}", e);
        eprintln!("stepper_sim: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => load_config(path)?,
        None => LoadedConfig {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "stepper-sim".to_string(),
            },
            machine: MachineConfig::default(),
        },
    };

    setup_tracing(&args, config.shared.log_level);

    info!(
        "Stepper Sim v{} starting ({})...",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let program = match args.program {
        Some(ref path) => {
            info!("Loading program from {:?}", path);
            Program::load(path)?
        }
        None => Program::demo_square(DEMO_SIZE),
    };

    let machine = &config.machine;
    let board = SimBoard::with_travel_switches(machine, SWITCH_MARGIN);
    let stepper = Stepper::new(board, machine);
    let mut mc = MotionControl::new(stepper, machine);

    let summary = run_program(&mut mc, &program, machine.default_feed_rate)?;
    print_summary(&summary, args.json)?;

    info!("Stepper Sim finished");
    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("program:          {}", summary.program);
        println!("steps:            {}", summary.steps);
        println!("position mm1000:  {:?}", summary.position);
        println!("position steps:   {:?}", summary.machine_position);
        println!("motor steps:      {}", summary.total_steps);
        println!("ticks:            {}", summary.ticks);
        println!("simulated ms:     {}", summary.simulated_ms);
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.as_tracing()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
